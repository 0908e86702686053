//! ETL Runtime
//!
//! A composable Extract-Transform-Load workflow engine with guaranteed
//! cleanup of every stage and lifecycle events for observers.

pub mod cli;
pub mod config;
pub mod disposable;
pub mod error;
pub mod etl;
pub mod events;
pub mod executor;
pub mod storage;
pub mod transform;
pub mod ui;
pub mod workflow;

// Re-exports for convenience
pub use disposable::{Disposable, DisposalScope, DisposeFlag};
pub use error::{EtlError, SharedError};
pub use etl::{
    Extractor, FailurePolicy, FanInSource, FanOutSink, IdentityTransformer, Loader, NullSink,
    Transformer,
};
pub use events::EventBus;
pub use executor::ConcurrentExecutor;
pub use workflow::{Runtime, Workflow, WorkflowBuilder, WorkflowDescriptor};
