//! Field dropper processor
//!
//! Removes named top-level fields from every record of a batch.

use crate::disposable::{Disposable, DisposeFlag};
use crate::etl::Transformer;
use eyre::Result;
use serde_json::Value;

/// Processor that drops the given fields from JSON objects
///
/// Non-object records pass through unchanged.
///
/// # Example
/// ```
/// use etl_runtime::transform::FieldDropper;
/// use etl_runtime::etl::Transformer;
/// use serde_json::json;
///
/// let dropper = FieldDropper::new(["created_at", "version"]);
/// let records = vec![json!({
///     "id": "test",
///     "created_at": "2024-01-01",
///     "version": "1.0",
///     "title": "My Object"
/// })];
///
/// let output = dropper.transform(records).unwrap();
/// assert!(!output[0].as_object().unwrap().contains_key("created_at"));
/// assert!(!output[0].as_object().unwrap().contains_key("version"));
/// assert_eq!(output[0]["title"], "My Object");
/// ```
pub struct FieldDropper {
    fields: Vec<String>,
    flag: DisposeFlag,
}

impl FieldDropper {
    /// Create a field dropper for the given field names
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            flag: DisposeFlag::new("FieldDropper"),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    fn drop_fields(&self, record: &mut Value) {
        if let Some(obj) = record.as_object_mut() {
            for field in &self.fields {
                obj.remove(field);
            }
        }
    }
}

impl Disposable for FieldDropper {
    fn is_disposed(&self) -> bool {
        self.flag.is_set()
    }

    fn dispose(&self) {
        self.flag.set();
    }
}

impl Transformer for FieldDropper {
    type Input = Vec<Value>;
    type Output = Vec<Value>;

    fn transform(&self, mut input: Self::Input) -> Result<Self::Output> {
        self.flag.ensure_active()?;
        input.iter_mut().for_each(|record| self.drop_fields(record));
        log::debug!(
            "Dropped {:?} from {} record(s)",
            self.fields,
            input.len()
        );
        Ok(input)
    }
}
