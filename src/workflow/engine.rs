//! Single-run execution engine

use super::{Workflow, WorkflowDescriptor};
use crate::disposable::DisposalScope;
use crate::error::{EtlError, share};
use crate::events::{EventBus, WorkflowCompleted, WorkflowFailed, WorkflowStarting};
use async_trait::async_trait;
use eyre::{Result, WrapErr, eyre};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;

/// Where a [`WorkflowRun`] currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Acquiring,
    Extracting,
    Transforming,
    Loading,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One execution of a [`WorkflowDescriptor`]
///
/// Acquires the three stages, runs extract, transform and load in sequence,
/// and releases every stage before reporting the outcome on the event bus.
pub struct WorkflowRun<'a, R, P> {
    descriptor: &'a WorkflowDescriptor<R, P>,
    events: &'a EventBus,
    state: RunState,
}

impl<'a, R, P> WorkflowRun<'a, R, P>
where
    R: Send + 'static,
    P: Send + 'static,
{
    pub fn new(descriptor: &'a WorkflowDescriptor<R, P>, events: &'a EventBus) -> Self {
        Self {
            descriptor,
            events,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        log::debug!(
            "[{}] {:?} -> {:?}",
            self.descriptor.id(),
            self.state,
            next
        );
        self.state = next;
    }

    /// Run the workflow to completion
    ///
    /// If a stage cannot be acquired nothing runs, the stages acquired so far
    /// are released and the error is returned without publishing any event.
    /// Otherwise a [`WorkflowStarting`] event is followed by either
    /// [`WorkflowCompleted`] or [`WorkflowFailed`], a panicking stage
    /// counting as a failure; in the failure case the
    /// returned report wraps [`EtlError::Stage`] holding the same error
    /// value that was published.
    pub async fn execute(&mut self) -> Result<()> {
        let descriptor = self.descriptor;
        log::info!(
            "[{} - {}] Execute ETL workflow",
            descriptor.id(),
            descriptor.name()
        );

        self.transition(RunState::Acquiring);
        let mut scope = DisposalScope::new();
        if let Err(e) = acquire_stages(descriptor, &mut scope) {
            scope.close();
            self.transition(RunState::Failed);
            log::error!("[{}] Could not acquire stages: {}", descriptor.id(), e);
            return Err(e.into());
        }

        let workflow = descriptor.workflow_ref();
        self.events.send(&WorkflowStarting {
            workflow: workflow.clone(),
        });

        let outcome = match AssertUnwindSafe(self.run_stages()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(eyre!(
                "Stage panicked while {:?}: {}",
                self.state,
                panic_message(&*panic)
            )),
        };
        scope.close();

        match outcome {
            Ok(()) => {
                self.transition(RunState::Completed);
                log::info!("[{}] Workflow completed", workflow);
                self.events.send(&WorkflowCompleted { workflow });
                Ok(())
            }
            Err(report) => {
                self.transition(RunState::Failed);
                let message = format!("Error running workflow '{}': {:#}", workflow, report);
                log::error!("{}", message);
                let error = share(report);
                self.events.send(&WorkflowFailed {
                    workflow: workflow.clone(),
                    message,
                    error: error.clone(),
                });
                Err(EtlError::Stage {
                    workflow: workflow.id,
                    source: error,
                }
                .into())
            }
        }
    }

    async fn run_stages(&mut self) -> Result<()> {
        let descriptor = self.descriptor;

        self.transition(RunState::Extracting);
        let extracted = descriptor
            .extractor()
            .extract()
            .await
            .wrap_err("Failed to extract data")?;

        self.transition(RunState::Transforming);
        let processed = descriptor
            .transformer()
            .transform(extracted)
            .wrap_err("Failed to process data")?;

        self.transition(RunState::Loading);
        descriptor
            .loader()
            .load(processed)
            .await
            .wrap_err("Failed to load data")
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn acquire_stages<R, P>(
    descriptor: &WorkflowDescriptor<R, P>,
    scope: &mut DisposalScope,
) -> Result<(), EtlError>
where
    R: Send + 'static,
    P: Send + 'static,
{
    scope.acquire(descriptor.extractor().clone())?;
    scope.acquire(descriptor.transformer().clone())?;
    scope.acquire(descriptor.loader().clone())?;
    Ok(())
}

#[async_trait]
impl<R, P> Workflow for WorkflowDescriptor<R, P>
where
    R: Send + 'static,
    P: Send + 'static,
{
    fn id(&self) -> &str {
        WorkflowDescriptor::id(self)
    }

    fn name(&self) -> &str {
        WorkflowDescriptor::name(self)
    }

    fn description(&self) -> Option<&str> {
        WorkflowDescriptor::description(self)
    }

    async fn execute(&self, events: &EventBus) -> Result<()> {
        WorkflowRun::new(self, events).execute().await
    }
}
