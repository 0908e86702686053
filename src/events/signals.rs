//! Lifecycle events published by the runtime

use super::Event;
use crate::error::SharedError;
use std::fmt;

/// Identity of a workflow as carried by events
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkflowRef {
    pub id: String,
    pub name: String,
}

impl WorkflowRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkflowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.name)
    }
}

/// Setup is done and normal operation can start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppReady;

/// The application is about to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppStopping;

/// Configuration could not be loaded or was invalid
#[derive(Debug, Clone)]
pub struct ConfigFailed {
    pub message: String,
    pub error: Option<SharedError>,
}

/// An error escaped to the outermost boundary at run time
#[derive(Debug, Clone)]
pub struct UnhandledRuntimeError {
    pub message: String,
    pub error: Option<SharedError>,
}

/// A workflow acquired its stages and is about to extract
#[derive(Debug, Clone)]
pub struct WorkflowStarting {
    pub workflow: WorkflowRef,
}

/// A workflow loaded its data and released its stages
#[derive(Debug, Clone)]
pub struct WorkflowCompleted {
    pub workflow: WorkflowRef,
}

/// A stage of a workflow raised an error
#[derive(Debug, Clone)]
pub struct WorkflowFailed {
    pub workflow: WorkflowRef,
    pub message: String,
    pub error: SharedError,
}

impl Event for AppReady {}
impl Event for AppStopping {}
impl Event for ConfigFailed {}
impl Event for UnhandledRuntimeError {}
impl Event for WorkflowStarting {}
impl Event for WorkflowCompleted {}
impl Event for WorkflowFailed {}
