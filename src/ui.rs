//! Console output for lifecycle events

use crate::error::SharedError;
use crate::events::{
    AppReady, AppStopping, ConfigFailed, EventBus, Subscription, UnhandledRuntimeError,
    WorkflowCompleted, WorkflowFailed, WorkflowStarting,
};
use owo_colors::OwoColorize;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

type Output = Arc<Mutex<Box<dyn Write + Send>>>;

/// Prints application and workflow events to the terminal
///
/// Errors and successes are always printed; "running" notices need a
/// verbosity of at least one.
#[derive(Clone)]
pub struct ConsoleUi {
    verbosity: u8,
    output: Output,
}

impl ConsoleUi {
    /// A console UI writing to standard error
    pub fn new(verbosity: u8) -> Self {
        Self::with_writer(verbosity, std::io::stderr())
    }

    pub fn with_writer(verbosity: u8, writer: impl Write + Send + 'static) -> Self {
        Self {
            verbosity,
            output: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Print the startup banner and subscribe to every event
    pub fn start(&self, events: &EventBus) -> Vec<Subscription> {
        self.info("Starting ...");

        vec![
            self.connect(events, |ui, _: &AppReady| ui.info("Started")),
            self.connect(events, |ui, _: &AppStopping| ui.info("Stopping ...")),
            self.connect(events, |ui, e: &ConfigFailed| {
                ui.error(&e.message, e.error.as_ref())
            }),
            self.connect(events, |ui, e: &UnhandledRuntimeError| {
                ui.error(&e.message, e.error.as_ref())
            }),
            self.connect(events, |ui, e: &WorkflowStarting| {
                ui.debug(&format!("- Running the workflow '{}' ...", e.workflow))
            }),
            self.connect(events, |ui, e: &WorkflowCompleted| {
                ui.success(&format!("- Completed workflow '{}' ✔", e.workflow))
            }),
            self.connect(events, |ui, e: &WorkflowFailed| {
                ui.error(
                    &format!("- Error running workflow '{}' ⚠", e.workflow),
                    Some(&e.error),
                )
            }),
        ]
    }

    /// Unsubscribe and print the closing line
    pub fn stop(&self, events: &EventBus, subscriptions: Vec<Subscription>) {
        for subscription in subscriptions {
            events.disconnect(subscription);
        }
        self.info("Done");
    }

    fn connect<E, F>(&self, events: &EventBus, handler: F) -> Subscription
    where
        E: crate::events::Event,
        F: Fn(&ConsoleUi, &E) + Send + Sync + 'static,
    {
        let ui = self.clone();
        events.connect(move |event: &E| handler(&ui, event))
    }

    fn info(&self, message: &str) {
        self.print(&message.bright_white().to_string());
    }

    fn debug(&self, message: &str) {
        if self.verbosity > 0 {
            self.print(&message.bright_black().to_string());
        }
    }

    fn success(&self, message: &str) {
        self.print(&message.green().to_string());
    }

    fn error(&self, message: &str, error: Option<&SharedError>) {
        self.print(&message.red().to_string());
        if let Some(error) = error {
            let root: &(dyn std::error::Error + 'static) = &**error;
            let mut source = Some(root);
            while let Some(cause) = source {
                self.print(&format!("  {}", cause.to_string().red()));
                source = cause.source();
            }
        }
    }

    fn print(&self, line: &str) {
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(output, "{}", line) {
            log::warn!("Failed to write to console: {}", e);
        }
    }
}
