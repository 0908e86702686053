//! Batch runtime over a set of workflow factories

use super::{Workflow, WorkflowFactory};
use crate::disposable::Disposable;
use crate::error::{EtlError, SharedError, share};
use crate::events::{EventBus, WorkflowRef};
use crate::executor::ConcurrentExecutor;
use eyre::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Outcome of one workflow in a batch
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub workflow: WorkflowRef,
    pub error: Option<SharedError>,
}

impl WorkflowOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-workflow outcomes of [`Runtime::run`], in workflow id order
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<WorkflowOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &WorkflowOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &WorkflowOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(WorkflowOutcome::is_success)
    }

    /// Fail with [`EtlError::WorkflowsFailed`] if any workflow failed
    pub fn into_result(self) -> Result<Self, EtlError> {
        let failed: Vec<String> = self.failed().map(|o| o.workflow.id.clone()).collect();
        if failed.is_empty() {
            Ok(self)
        } else {
            Err(EtlError::WorkflowsFailed(failed))
        }
    }
}

/// Lists and runs the workflows produced by a set of factories
///
/// Factories are injected by the caller; the runtime asks each of them for
/// a fresh workflow on every [`list_workflows`](Runtime::list_workflows) or
/// [`run`](Runtime::run) call.
pub struct Runtime {
    factories: Vec<WorkflowFactory>,
    events: Arc<EventBus>,
    max_workers: Option<usize>,
}

impl Runtime {
    pub fn new(factories: Vec<WorkflowFactory>, events: Arc<EventBus>) -> Self {
        Self {
            factories,
            events,
            max_workers: None,
        }
    }

    /// Limit how many workflows of a batch run at the same time
    pub fn with_max_workers(mut self, max_workers: Option<usize>) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Build every workflow, keyed by id
    ///
    /// # Errors
    /// Returns a configuration error if a factory fails or two workflows
    /// share an id.
    pub fn list_workflows(&self) -> Result<BTreeMap<String, Arc<dyn Workflow>>, EtlError> {
        let mut workflows = BTreeMap::new();
        for (index, factory) in self.factories.iter().enumerate() {
            let workflow = factory().map_err(|e| {
                EtlError::configuration(format!("workflow factory #{} failed: {:#}", index, e))
            })?;
            let id = workflow.id().to_string();
            if workflows.insert(id.clone(), workflow).is_some() {
                return Err(EtlError::configuration(format!(
                    "duplicate workflow id '{}'",
                    id
                )));
            }
        }
        log::debug!("Resolved {} workflow(s)", workflows.len());
        Ok(workflows)
    }

    /// Run the selected workflows, or all of them when `select` is `None`
    ///
    /// Workflows run concurrently and independently: a failing workflow does
    /// not stop its siblings. Each failure is published as a
    /// [`WorkflowFailed`](crate::events::WorkflowFailed) event and recorded
    /// in the returned report.
    ///
    /// # Errors
    /// Returns [`EtlError::UnknownWorkflows`] (before running anything) if a
    /// selected id is not registered, or a configuration error if the
    /// workflows cannot be built.
    pub async fn run(&self, select: Option<&[String]>) -> Result<BatchReport, EtlError> {
        let mut workflows = self.list_workflows()?;

        let selected: Vec<Arc<dyn Workflow>> = match select {
            None => workflows.into_values().collect(),
            Some(ids) => {
                let requested: BTreeSet<&String> = ids.iter().collect();
                let missing: Vec<String> = requested
                    .iter()
                    .filter(|id| !workflows.contains_key(id.as_str()))
                    .map(|id| id.to_string())
                    .collect();
                if !missing.is_empty() {
                    return Err(EtlError::UnknownWorkflows(missing));
                }
                requested
                    .into_iter()
                    .filter_map(|id| workflows.remove(id))
                    .collect()
            }
        };

        if selected.is_empty() {
            log::info!("No workflows selected");
            return Ok(BatchReport::default());
        }

        log::info!("Running {} workflow(s)", selected.len());
        let executor = ConcurrentExecutor::from_limit(self.max_workers)?;
        let refs: Vec<WorkflowRef> = selected.iter().map(|w| w.workflow_ref()).collect();
        let tasks: Vec<_> = selected
            .into_iter()
            .map(|workflow| {
                let events = self.events.clone();
                async move { workflow.execute(&events).await }
            })
            .collect();

        let results = executor.execute(tasks).await;
        executor.dispose();

        let outcomes = refs
            .into_iter()
            .zip(results?)
            .map(|(workflow, result)| WorkflowOutcome {
                workflow,
                error: result.err().map(share),
            })
            .collect();
        let report = BatchReport { outcomes };

        log::info!(
            "Batch finished: {} succeeded, {} failed",
            report.succeeded().count(),
            report.failed().count()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::{IdentityTransformer, NullSink, extractor_fn};
    use crate::workflow::{WorkflowDescriptor, workflow_factory};

    fn factory(id: &'static str) -> WorkflowFactory {
        workflow_factory(move || {
            Ok(WorkflowDescriptor::<i32, i32>::new(
                id,
                id.to_uppercase(),
                Arc::new(extractor_fn(|| async { Ok(1) })),
                Arc::new(IdentityTransformer::new()),
                Arc::new(NullSink::new()),
            )?)
        })
    }

    fn runtime(ids: &[&'static str]) -> Runtime {
        Runtime::new(
            ids.iter().copied().map(factory).collect(),
            Arc::new(EventBus::new()),
        )
    }

    #[test]
    fn test_list_workflows_by_id() {
        let workflows = runtime(&["beta", "alpha"]).list_workflows().unwrap();
        let ids: Vec<&str> = workflows.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
        assert_eq!(workflows["alpha"].name(), "ALPHA");
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let err = runtime(&["same", "same"]).list_workflows().err().expect("expected error");
        assert!(matches!(err, EtlError::Configuration(ref msg) if msg.contains("duplicate")));
    }

    #[test]
    fn test_failing_factory_is_a_configuration_error() {
        let failing: WorkflowFactory =
            Arc::new(|| -> Result<Arc<dyn Workflow>> { Err(eyre::eyre!("no such file")) });
        let runtime = Runtime::new(vec![failing], Arc::new(EventBus::new()));
        let err = runtime.list_workflows().err().expect("expected error");
        assert!(matches!(err, EtlError::Configuration(ref msg) if msg.contains("no such file")));
    }

    #[tokio::test]
    async fn test_unknown_ids_are_reported_sorted() {
        let select = vec!["zeta".to_string(), "alpha".to_string(), "known".to_string()];
        let err = runtime(&["known"]).run(Some(select.as_slice())).await.unwrap_err();
        match err {
            EtlError::UnknownWorkflows(ids) => assert_eq!(ids, vec!["alpha", "zeta"]),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_run_all_and_subset() {
        let runtime = runtime(&["one", "two", "three"]);

        let report = runtime.run(None).await.unwrap();
        assert_eq!(report.outcomes.len(), 3);
        assert!(report.is_success());

        let select = vec!["two".to_string()];
        let report = runtime.run(Some(select.as_slice())).await.unwrap();
        let ids: Vec<&str> = report.outcomes.iter().map(|o| o.workflow.id.as_str()).collect();
        assert_eq!(ids, vec!["two"]);
    }

    #[tokio::test]
    async fn test_empty_selection_runs_nothing() {
        let report = runtime(&["one"]).run(Some(Vec::new().as_slice())).await.unwrap();
        assert!(report.outcomes.is_empty());
        assert!(report.into_result().is_ok());
    }

    #[tokio::test]
    async fn test_zero_worker_limit_is_rejected() {
        let runtime = runtime(&["one"]).with_max_workers(Some(0));
        let err = runtime.run(None).await.unwrap_err();
        assert!(matches!(err, EtlError::Configuration(_)));
    }
}
