//! Event bus and lifecycle events
//!
//! Execution publishes events here; observers such as the console UI
//! subscribe to them without the engine knowing who is listening.

mod bus;
mod signals;

pub use bus::{Event, EventBus, Subscription};
pub use signals::{
    AppReady, AppStopping, ConfigFailed, UnhandledRuntimeError, WorkflowCompleted,
    WorkflowFailed, WorkflowRef, WorkflowStarting,
};
