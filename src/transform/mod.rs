//! Record processors for JSON batches

mod field_dropper;

pub use field_dropper::FieldDropper;
