//! Concurrent task executor
//!
//! Runs a batch of independent futures on the tokio runtime and hands back
//! one outcome per task, in submission order, once every task has finished.

use crate::disposable::{Disposable, DisposeFlag};
use crate::error::EtlError;
use eyre::{Result, eyre};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Disposable worker pool over tokio tasks
///
/// With no worker limit every task of a batch runs at once. With
/// [`with_max_workers`](ConcurrentExecutor::with_max_workers) at most that
/// many tasks of a batch make progress at the same time.
///
/// # Example
/// ```
/// use etl_runtime::executor::ConcurrentExecutor;
///
/// # async fn example() -> eyre::Result<()> {
/// let executor = ConcurrentExecutor::new();
/// let tasks: Vec<_> = (1..=3).map(|n| async move { Ok(n * 10) }).collect();
/// let outcomes = executor.execute(tasks).await?;
/// assert_eq!(outcomes.len(), 3);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConcurrentExecutor {
    permits: Option<Arc<Semaphore>>,
    flag: DisposeFlag,
}

impl Default for ConcurrentExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConcurrentExecutor {
    /// Create an executor without a worker limit
    pub fn new() -> Self {
        Self {
            permits: None,
            flag: DisposeFlag::new("ConcurrentExecutor"),
        }
    }

    /// Create an executor that runs at most `max_workers` tasks at a time
    ///
    /// # Errors
    /// Returns a configuration error if `max_workers` is zero.
    pub fn with_max_workers(max_workers: usize) -> Result<Self, EtlError> {
        if max_workers == 0 {
            return Err(EtlError::configuration(
                "'max_workers' must be greater than zero",
            ));
        }
        Ok(Self {
            permits: Some(Arc::new(Semaphore::new(max_workers))),
            flag: DisposeFlag::new("ConcurrentExecutor"),
        })
    }

    /// Build an executor from an optional limit
    pub fn from_limit(max_workers: Option<usize>) -> Result<Self, EtlError> {
        match max_workers {
            Some(limit) => Self::with_max_workers(limit),
            None => Ok(Self::new()),
        }
    }

    /// Run every task concurrently and wait for all of them
    ///
    /// The returned vector has one entry per task, in the order the tasks
    /// were given, regardless of completion order. A panicking task is
    /// reported as a failed outcome rather than tearing down the batch.
    ///
    /// # Errors
    /// Returns [`EtlError::ResourceDisposed`] if the executor was disposed.
    pub async fn execute<T, F>(&self, tasks: Vec<F>) -> Result<Vec<Result<T>>, EtlError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        self.flag.ensure_active()?;

        let total = tasks.len();
        let mut set = JoinSet::new();

        for (index, task) in tasks.into_iter().enumerate() {
            let permits = self.permits.clone();
            set.spawn(async move {
                let _permit = match permits {
                    Some(permits) => match permits.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return (index, Err(eyre!("executor was disposed"))),
                    },
                    None => None,
                };
                (index, task.await)
            });
        }

        let mut slots: Vec<Option<Result<T>>> = (0..total).map(|_| None).collect();
        while let Some(res) = set.join_next().await {
            match res {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => log::error!("Task panicked: {}", e),
            }
        }

        Ok(slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(eyre!("task panicked before completing"))))
            .collect())
    }
}

impl Disposable for ConcurrentExecutor {
    fn is_disposed(&self) -> bool {
        self.flag.is_set()
    }

    fn dispose(&self) {
        if self.flag.set() {
            if let Some(permits) = &self.permits {
                permits.close();
            }
            log::debug!("ConcurrentExecutor disposal complete");
        }
    }
}
