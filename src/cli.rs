//! CLI command handlers

use crate::workflow::Runtime;
use eyre::Result;
use owo_colors::OwoColorize;
use std::io::Write;

/// Print the known workflows, one per line, sorted by id
///
/// Returns the number of workflows listed.
pub fn list_workflows(runtime: &Runtime, out: &mut impl Write) -> Result<usize> {
    let workflows = runtime.list_workflows()?;
    for (id, workflow) in &workflows {
        match workflow.description() {
            Some(description) => writeln!(
                out,
                "{}  {}  {}",
                id.cyan(),
                workflow.name(),
                description.bright_black()
            )?,
            None => writeln!(out, "{}  {}", id.cyan(), workflow.name())?,
        }
    }
    log::debug!("Listed {} workflow(s)", workflows.len());
    Ok(workflows.len())
}

/// Run the selected workflows, or all of them when `selected` is empty
///
/// Returns the number of workflows that ran. Unknown ids and invalid
/// configuration fail before anything runs; if any workflow fails the
/// result is [`EtlError::WorkflowsFailed`](crate::EtlError::WorkflowsFailed)
/// after every selected workflow has finished.
pub async fn run_workflows(runtime: &Runtime, selected: &[String]) -> Result<usize> {
    let select = (!selected.is_empty()).then_some(selected);

    let report = runtime.run(select).await?.into_result()?;
    log::info!("{} workflow(s) completed", report.outcomes.len());
    Ok(report.outcomes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use crate::etl::{IdentityTransformer, NullSink, extractor_fn};
    use crate::events::EventBus;
    use crate::workflow::{WorkflowDescriptor, WorkflowFactory, workflow_factory};
    use std::sync::Arc;

    fn factory(id: &'static str, fail: bool) -> WorkflowFactory {
        workflow_factory(move || {
            Ok(WorkflowDescriptor::<i32, i32>::new(
                id,
                "Numbers",
                Arc::new(extractor_fn(move || async move {
                    if fail {
                        eyre::bail!("source offline");
                    }
                    Ok(1)
                })),
                Arc::new(IdentityTransformer::new()),
                Arc::new(NullSink::new()),
            )?
            .with_description((id == "with-doc").then(|| "Documented".to_string())))
        })
    }

    #[test]
    fn test_list_prints_sorted_ids() {
        let runtime = Runtime::new(
            vec![factory("zz", false), factory("with-doc", false)],
            Arc::new(EventBus::new()),
        );
        let mut out = Vec::new();

        let count = list_workflows(&runtime, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(count, 2);
        assert!(text.find("with-doc").unwrap() < text.find("zz").unwrap());
        assert!(text.contains("Documented"));
    }

    #[tokio::test]
    async fn test_run_reports_failures() {
        let runtime = Runtime::new(
            vec![factory("good", false), factory("bad", true)],
            Arc::new(EventBus::new()),
        );

        let err = run_workflows(&runtime, &[]).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EtlError>(),
            Some(EtlError::WorkflowsFailed(ids)) if ids == &["bad".to_string()]
        ));

        let count = run_workflows(&runtime, &["good".to_string()]).await.unwrap();
        assert_eq!(count, 1);
    }
}
