//! Error taxonomy for the ETL runtime
//!
//! Stage implementations return plain `eyre::Result`s. The runtime itself
//! raises the typed [`EtlError`] variants below, which travel inside an
//! `eyre::Report` and can be recovered with `downcast_ref::<EtlError>()`.

use std::error::Error as StdError;
use std::path::PathBuf;
use std::sync::Arc;

/// An error value that can be handed to several observers at once
///
/// Used where the same failure must be both published on the event bus and
/// returned to the caller.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Convert an `eyre::Report` into a [`SharedError`], keeping its cause chain
pub fn share(report: eyre::Report) -> SharedError {
    let boxed: Box<dyn StdError + Send + Sync + 'static> = report.into();
    Arc::from(boxed)
}

/// Errors raised by the ETL runtime
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    /// An operation was attempted on a resource after it was disposed
    #[error("resource '{resource}' has already been disposed")]
    ResourceDisposed { resource: String },

    /// Invalid builder, descriptor or aggregate construction
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A configuration file could not be read or parsed
    #[error("failed to load configuration from '{}': {reason}", .path.display())]
    ConfigLoad { path: PathBuf, reason: String },

    /// One or more requested workflow ids are not registered
    #[error("the following workflow(s) do not exist: '{}'", .0.join(","))]
    UnknownWorkflows(Vec<String>),

    /// A stage raised an error while a workflow was running
    #[error("workflow '{workflow}' failed")]
    Stage {
        workflow: String,
        #[source]
        source: SharedError,
    },

    /// Every member of a fan-in or fan-out aggregate failed, or the
    /// aggregate's failure policy rejected a partial failure
    #[error("{aggregate}: {failed} of {total} member(s) failed")]
    AggregateFailed {
        aggregate: &'static str,
        failed: usize,
        total: usize,
    },

    /// Some workflows of a batch run failed
    #[error("{} workflow(s) failed: {}", .0.len(), .0.join(", "))]
    WorkflowsFailed(Vec<String>),
}

impl EtlError {
    pub fn disposed(resource: impl Into<String>) -> Self {
        Self::ResourceDisposed {
            resource: resource.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Process exit status used by the binary for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::ConfigLoad { .. } => 2,
            Self::Configuration(_) => 3,
            Self::UnknownWorkflows(_) => 4,
            _ => 5,
        }
    }
}

/// Exit status for an arbitrary report, falling back to the runtime error code
pub fn exit_code_of(report: &eyre::Report) -> u8 {
    report
        .downcast_ref::<EtlError>()
        .map(EtlError::exit_code)
        .unwrap_or(5)
}
