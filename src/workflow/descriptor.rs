//! Workflow descriptors

use crate::error::EtlError;
use crate::etl::{ProcessorRef, SinkRef, SourceRef};
use crate::events::WorkflowRef;

/// Check that `id` can be used as a workflow key
///
/// Any id of at least two characters is accepted.
pub fn validate_workflow_id(id: &str) -> Result<(), EtlError> {
    if id.chars().count() < 2 {
        return Err(EtlError::configuration(format!(
            "invalid workflow id '{}': expected at least two characters",
            id
        )));
    }
    Ok(())
}

/// Immutable bundle of a workflow's identity and its three stages
///
/// The descriptor references its stages but does not dispose them; each run
/// acquires and releases them. Since stages are disposed at the end of a
/// run, a descriptor is good for a single run unless its stages are
/// stateless and reentrant.
pub struct WorkflowDescriptor<R, P> {
    id: String,
    name: String,
    description: Option<String>,
    extractor: SourceRef<R>,
    transformer: ProcessorRef<R, P>,
    loader: SinkRef<P>,
}

impl<R, P> Clone for WorkflowDescriptor<R, P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            extractor: self.extractor.clone(),
            transformer: self.transformer.clone(),
            loader: self.loader.clone(),
        }
    }
}

impl<R, P> std::fmt::Debug for WorkflowDescriptor<R, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl<R, P> WorkflowDescriptor<R, P> {
    /// Create a descriptor
    ///
    /// # Errors
    /// Returns a configuration error if `id` is not a valid workflow id.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        extractor: SourceRef<R>,
        transformer: ProcessorRef<R, P>,
        loader: SinkRef<P>,
    ) -> Result<Self, EtlError> {
        let id = id.into();
        validate_workflow_id(&id)?;
        Ok(Self {
            id,
            name: name.into(),
            description: None,
            extractor,
            transformer,
            loader,
        })
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn extractor(&self) -> &SourceRef<R> {
        &self.extractor
    }

    pub fn transformer(&self) -> &ProcessorRef<R, P> {
        &self.transformer
    }

    pub fn loader(&self) -> &SinkRef<P> {
        &self.loader
    }

    pub fn workflow_ref(&self) -> WorkflowRef {
        WorkflowRef::new(&self.id, &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::{IdentityTransformer, NullSink, extractor_fn};
    use std::sync::Arc;

    fn descriptor(id: &str) -> Result<WorkflowDescriptor<i32, i32>, EtlError> {
        WorkflowDescriptor::new(
            id,
            "Numbers",
            Arc::new(extractor_fn(|| async { Ok(1) })),
            Arc::new(IdentityTransformer::new()),
            Arc::new(NullSink::new()),
        )
    }

    #[test]
    fn test_valid_ids() {
        for id in ["ab", "fyj-iit", "daily export", "slash/id", "données", "日報"] {
            assert!(validate_workflow_id(id).is_ok(), "{} should be valid", id);
        }
    }

    #[test]
    fn test_invalid_ids() {
        for id in ["", "a", "é"] {
            assert!(validate_workflow_id(id).is_err(), "{} should be invalid", id);
        }
    }

    #[test]
    fn test_descriptor_rejects_bad_id() {
        let err = descriptor("x").unwrap_err();
        assert!(matches!(err, EtlError::Configuration(_)));
    }

    #[test]
    fn test_descriptor_accepts_spaced_id() {
        let descriptor = descriptor("daily export").unwrap();
        assert_eq!(descriptor.id(), "daily export");
    }

    #[test]
    fn test_descriptor_identity() {
        let descriptor = descriptor("numbers")
            .unwrap()
            .with_description(Some("Counts things".to_string()));

        assert_eq!(descriptor.id(), "numbers");
        assert_eq!(descriptor.name(), "Numbers");
        assert_eq!(descriptor.description(), Some("Counts things"));
        assert_eq!(descriptor.workflow_ref().to_string(), "numbers:Numbers");
    }
}
