//! File system connectors
//!
//! Concrete sources and sinks for newline-delimited JSON files.

mod ndjson;

pub use ndjson::{NdjsonSink, NdjsonSource};
