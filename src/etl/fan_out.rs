//! Fan-out multiplexing of one value to many data sinks

use super::{FailurePolicy, Loader, SinkRef};
use crate::disposable::{Disposable, DisposeFlag};
use crate::error::EtlError;
use crate::executor::ConcurrentExecutor;
use async_trait::async_trait;
use eyre::Result;

/// Drains the same value into every member sink concurrently
///
/// Every member receives its own clone of the input. Failing members never
/// cancel siblings that were already dispatched. By default the drain fails
/// when any member failed ([`FailurePolicy::FailFast`]), so a failing sink
/// never silently succeeds; with [`FailurePolicy::BestEffort`] partial
/// failures are only logged.
///
/// The aggregate owns its members. Disposing it disposes every member and
/// its executor.
pub struct FanOutSink<T> {
    sinks: Vec<SinkRef<T>>,
    executor: ConcurrentExecutor,
    policy: FailurePolicy,
    flag: DisposeFlag,
}

impl<T: Clone + Send + Sync + 'static> FanOutSink<T> {
    /// Create an aggregate over at least one sink
    ///
    /// # Errors
    /// Returns a configuration error if `sinks` is empty.
    pub fn new(sinks: Vec<SinkRef<T>>) -> Result<Self, EtlError> {
        if sinks.is_empty() {
            return Err(EtlError::configuration(
                "a fan-out sink requires at least one member sink",
            ));
        }
        Ok(Self {
            sinks,
            executor: ConcurrentExecutor::new(),
            policy: FailurePolicy::FailFast,
            flag: DisposeFlag::new("FanOutSink"),
        })
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the executor used to run member drains
    ///
    /// The executor being replaced is disposed.
    pub fn with_executor(mut self, executor: ConcurrentExecutor) -> Self {
        std::mem::replace(&mut self.executor, executor).dispose();
        self
    }

    pub fn executor(&self) -> &ConcurrentExecutor {
        &self.executor
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn sinks(&self) -> &[SinkRef<T>] {
        &self.sinks
    }
}

impl<T: Clone + Send + Sync + 'static> Disposable for FanOutSink<T> {
    fn is_disposed(&self) -> bool {
        self.flag.is_set()
    }

    fn dispose(&self) {
        if self.flag.set() {
            for sink in &self.sinks {
                sink.dispose();
            }
            self.executor.dispose();
            log::debug!("FanOutSink disposal complete");
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Loader for FanOutSink<T> {
    type Input = T;

    async fn load(&self, input: Self::Input) -> Result<()> {
        self.flag.ensure_active()?;
        log::debug!(
            "Multiplexing processed data to {} data sink(s)",
            self.sinks.len()
        );

        let tasks: Vec<_> = self
            .sinks
            .iter()
            .map(|sink| {
                let sink = sink.clone();
                let value = input.clone();
                async move { sink.load(value).await }
            })
            .collect();

        let outcomes = self.executor.execute(tasks).await?;
        let total = outcomes.len();

        let mut first_error = None;
        let mut failed = 0;
        for (index, outcome) in outcomes.into_iter().enumerate() {
            if let Err(e) = outcome {
                log::warn!("Data sink #{} failed: {:#}", index, e);
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        if self.policy.rejects(failed, total) {
            let aggregate = EtlError::AggregateFailed {
                aggregate: "FanOutSink",
                failed,
                total,
            };
            return Err(match first_error {
                Some(e) => e.wrap_err(aggregate),
                None => aggregate.into(),
            });
        }

        if failed > 0 {
            log::warn!("{} of {} data sink(s) failed, continuing", failed, total);
        }
        Ok(())
    }
}
