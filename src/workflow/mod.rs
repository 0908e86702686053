//! Workflows: descriptors, builder, single-run engine and batch runtime

mod builder;
mod descriptor;
mod engine;
mod runtime;

pub use builder::WorkflowBuilder;
pub use descriptor::{WorkflowDescriptor, validate_workflow_id};
pub use engine::{RunState, WorkflowRun};
pub use runtime::{BatchReport, Runtime, WorkflowOutcome};

use crate::events::{EventBus, WorkflowRef};
use async_trait::async_trait;
use eyre::Result;
use std::sync::Arc;

/// A runnable workflow with its data types erased
///
/// Lets workflows over different record types share one registry.
#[async_trait]
pub trait Workflow: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> Option<&str>;

    fn workflow_ref(&self) -> WorkflowRef {
        WorkflowRef::new(self.id(), self.name())
    }

    /// Run the workflow once, publishing its lifecycle events on `events`
    async fn execute(&self, events: &EventBus) -> Result<()>;
}

/// Zero-argument constructor of a fresh workflow
///
/// Stages are released at the end of each run, so the runtime asks the
/// factory for a new workflow every time it needs one.
pub type WorkflowFactory = Arc<dyn Fn() -> Result<Arc<dyn Workflow>> + Send + Sync>;

/// Wrap a closure as a [`WorkflowFactory`]
pub fn workflow_factory<F, W>(f: F) -> WorkflowFactory
where
    F: Fn() -> Result<W> + Send + Sync + 'static,
    W: Workflow + 'static,
{
    Arc::new(move || Ok(Arc::new(f()?) as Arc<dyn Workflow>))
}
