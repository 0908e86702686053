//! Runtime configuration
//!
//! Loads the runtime settings and the declarative workflow definitions from a
//! TOML, YAML or JSON5 file, and turns each definition into a
//! [`WorkflowFactory`].
//!
//! ```toml
//! max_workers = 4
//! sink_failure_policy = "best_effort"
//!
//! [[workflows]]
//! id = "daily-export"
//! name = "Daily export"
//! sources = ["in/a.ndjson", "in/b.ndjson"]
//! drop_fields = ["updated_at"]
//! sinks = ["out/all.ndjson"]
//! ```

use crate::error::EtlError;
use crate::etl::{FailurePolicy, FanInSource, FanOutSink, Gather, SinkRef, SourceRef};
use crate::executor::ConcurrentExecutor;
use crate::storage::{NdjsonSink, NdjsonSource};
use crate::transform::FieldDropper;
use crate::workflow::{
    WorkflowBuilder, WorkflowDescriptor, WorkflowFactory, validate_workflow_id, workflow_factory,
};
use eyre::Result;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Overrides `max_workers` when set
pub const MAX_WORKERS_ENV: &str = "ETL_RUNTIME_MAX_WORKERS";

/// Records handled by configured workflows
pub type Records = Vec<Value>;

/// Syntax of a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ConfigFormat {
    /// Pick by file extension, falling back to TOML
    #[default]
    Auto,
    Toml,
    Yaml,
    /// JSON, parsed leniently as JSON5
    Json,
}

impl ConfigFormat {
    /// Resolve [`Auto`](ConfigFormat::Auto) against the file extension
    pub fn resolve(self, path: &Path) -> Self {
        if self != Self::Auto {
            return self;
        }
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("yaml" | "yml") => Self::Yaml,
            Some("json" | "json5") => Self::Json,
            _ => Self::Toml,
        }
    }
}

/// Settings for the whole runtime
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Upper bound on concurrently running workflows and aggregate members
    #[serde(default)]
    pub max_workers: Option<usize>,

    #[serde(default)]
    pub source_failure_policy: FailurePolicy,

    #[serde(default = "default_sink_failure_policy")]
    pub sink_failure_policy: FailurePolicy,

    #[serde(default)]
    pub workflows: Vec<WorkflowConfig>,
}

fn default_sink_failure_policy() -> FailurePolicy {
    FailurePolicy::FailFast
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            source_failure_policy: FailurePolicy::default(),
            sink_failure_policy: default_sink_failure_policy(),
            workflows: Vec::new(),
        }
    }
}

/// A workflow reading NDJSON files, dropping fields, and writing NDJSON files
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub sources: Vec<PathBuf>,
    #[serde(default)]
    pub drop_fields: Vec<String>,
    #[serde(default)]
    pub sinks: Vec<PathBuf>,
}

/// Read and validate a configuration file
///
/// Relative source and sink paths are resolved against the directory of the
/// configuration file.
///
/// # Errors
/// Returns [`EtlError::ConfigLoad`] if the file cannot be read or parsed and
/// [`EtlError::Configuration`] if its contents are invalid.
pub fn load_config_file(path: &Path, format: ConfigFormat) -> Result<RuntimeConfig, EtlError> {
    let format = format.resolve(path);
    log::debug!("Loading {:?} configuration from {}", format, path.display());

    let load_error = |reason: String| EtlError::ConfigLoad {
        path: path.to_path_buf(),
        reason,
    };
    let content = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
    let mut config = parse_config(&content, format).map_err(load_error)?;

    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    config.validate()?;
    Ok(config)
}

/// Parse configuration text in the given format
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<RuntimeConfig, String> {
    match format {
        ConfigFormat::Auto | ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| e.to_string())
        }
        ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        ConfigFormat::Json => json5::from_str(content).map_err(|e| e.to_string()),
    }
}

impl RuntimeConfig {
    /// Check workflow ids, sources and the worker limit
    pub fn validate(&self) -> Result<(), EtlError> {
        if self.max_workers == Some(0) {
            return Err(EtlError::configuration(
                "'max_workers' must be greater than zero",
            ));
        }

        let mut seen = HashSet::new();
        for workflow in &self.workflows {
            validate_workflow_id(&workflow.id)?;
            if !seen.insert(workflow.id.as_str()) {
                return Err(EtlError::configuration(format!(
                    "duplicate workflow id '{}'",
                    workflow.id
                )));
            }
            if workflow.sources.is_empty() {
                return Err(EtlError::configuration(format!(
                    "workflow '{}': at least one source required",
                    workflow.id
                )));
            }
        }
        Ok(())
    }

    /// Apply `ETL_RUNTIME_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), EtlError> {
        if let Ok(value) = std::env::var(MAX_WORKERS_ENV) {
            let max_workers = value.trim().parse::<usize>().map_err(|_| {
                EtlError::configuration(format!(
                    "{} must be a positive integer, got '{}'",
                    MAX_WORKERS_ENV, value
                ))
            })?;
            log::debug!("{} overrides max_workers to {}", MAX_WORKERS_ENV, max_workers);
            self.max_workers = Some(max_workers);
        }
        self.validate()
    }

    fn resolve_paths(&mut self, base: &Path) {
        for workflow in &mut self.workflows {
            for path in workflow.sources.iter_mut().chain(workflow.sinks.iter_mut()) {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
    }

    /// One factory per configured workflow, in file order
    pub fn workflow_factories(&self) -> Vec<WorkflowFactory> {
        self.workflows
            .iter()
            .map(|workflow| {
                let workflow = workflow.clone();
                let settings = StageSettings {
                    max_workers: self.max_workers,
                    source_policy: self.source_failure_policy,
                    sink_policy: self.sink_failure_policy,
                };
                workflow_factory(move || Ok(workflow.descriptor(settings)?))
            })
            .collect()
    }
}

/// Runtime-wide settings applied to every configured workflow
#[derive(Debug, Clone, Copy)]
pub struct StageSettings {
    pub max_workers: Option<usize>,
    pub source_policy: FailurePolicy,
    pub sink_policy: FailurePolicy,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            max_workers: None,
            source_policy: FailurePolicy::BestEffort,
            sink_policy: FailurePolicy::FailFast,
        }
    }
}

impl StageSettings {
    /// Fan several sources in under the source policy and worker limit
    pub fn fan_in<R>(&self, sources: Vec<SourceRef<R>>) -> Result<SourceRef<R>, EtlError>
    where
        R: Gather + Send + 'static,
    {
        let fan_in = FanInSource::new(sources)?
            .with_policy(self.source_policy)
            .with_executor(ConcurrentExecutor::from_limit(self.max_workers)?);
        let source: SourceRef<R> = Arc::new(fan_in.gathered());
        Ok(source)
    }

    /// Fan a value out to several sinks under the sink policy and worker limit
    pub fn fan_out<P>(&self, sinks: Vec<SinkRef<P>>) -> Result<SinkRef<P>, EtlError>
    where
        P: Clone + Send + Sync + 'static,
    {
        let fan_out = FanOutSink::new(sinks)?
            .with_policy(self.sink_policy)
            .with_executor(ConcurrentExecutor::from_limit(self.max_workers)?);
        let sink: SinkRef<P> = Arc::new(fan_out);
        Ok(sink)
    }
}

impl WorkflowConfig {
    /// Build a fresh descriptor for this workflow
    pub fn descriptor(
        &self,
        settings: StageSettings,
    ) -> Result<WorkflowDescriptor<Records, Records>, EtlError> {
        let mut builder = WorkflowBuilder::new(&self.id, &self.name)
            .with_composite_source_factory(move |sources| settings.fan_in(sources))
            .with_composite_sink_factory(move |sinks| settings.fan_out(sinks));
        if let Some(description) = &self.description {
            builder = builder.with_description(description);
        }

        for source in &self.sources {
            builder.add_source(Arc::new(NdjsonSource::new(source)))?;
        }
        if !self.drop_fields.is_empty() {
            builder.add_processor(Arc::new(FieldDropper::new(self.drop_fields.iter().cloned())))?;
        }
        for sink in &self.sinks {
            builder.add_sink(Arc::new(NdjsonSink::new(sink)))?;
        }

        builder.build()
    }
}
