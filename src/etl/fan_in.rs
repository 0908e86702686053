//! Fan-in aggregation of many data sources

use super::{Extractor, FailurePolicy, SourceRef};
use crate::disposable::{Disposable, DisposeFlag};
use crate::error::EtlError;
use crate::executor::ConcurrentExecutor;
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use serde_json::Value;

/// Draws from every member source concurrently and returns their results in
/// registration order
///
/// Member failures are handled according to the aggregate's
/// [`FailurePolicy`] (best-effort by default): failed members are logged and
/// left out of the result, and the draw fails when every member failed.
///
/// The aggregate owns its members. Disposing it disposes every member and
/// its executor.
///
/// # Example
/// ```
/// use etl_runtime::etl::{Extractor, FanInSource, SourceRef, extractor_fn};
/// use std::sync::Arc;
///
/// # async fn example() -> eyre::Result<()> {
/// let a: SourceRef<i32> = Arc::new(extractor_fn(|| async { Ok(1) }));
/// let b: SourceRef<i32> = Arc::new(extractor_fn(|| async { Ok(2) }));
///
/// let fan_in = FanInSource::new(vec![a, b])?;
/// assert_eq!(fan_in.extract().await?, vec![1, 2]);
/// # Ok(())
/// # }
/// ```
pub struct FanInSource<T> {
    sources: Vec<SourceRef<T>>,
    executor: ConcurrentExecutor,
    policy: FailurePolicy,
    flag: DisposeFlag,
}

impl<T: Send + 'static> FanInSource<T> {
    /// Create an aggregate over at least one source
    ///
    /// # Errors
    /// Returns a configuration error if `sources` is empty.
    pub fn new(sources: Vec<SourceRef<T>>) -> Result<Self, EtlError> {
        if sources.is_empty() {
            return Err(EtlError::configuration(
                "a fan-in source requires at least one member source",
            ));
        }
        Ok(Self {
            sources,
            executor: ConcurrentExecutor::new(),
            policy: FailurePolicy::BestEffort,
            flag: DisposeFlag::new("FanInSource"),
        })
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the executor used to run member draws
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

    pub fn sources(&self) -> &[SourceRef<T>] {
        &self.sources
    }

    /// Merge the drawn sequence back into a single `T`
    pub fn gathered(self) -> Gathered<T>
    where
        T: Gather,
    {
        Gathered { inner: self }
    }
}

impl<T: Send + 'static> Disposable for FanInSource<T> {
    fn is_disposed(&self) -> bool {
        self.flag.is_set()
    }

    fn dispose(&self) {
        if self.flag.set() {
            for source in &self.sources {
                source.dispose();
            }
            self.executor.dispose();
            log::debug!("FanInSource disposal complete");
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Extractor for FanInSource<T> {
    type Output = Vec<T>;

    async fn extract(&self) -> Result<Self::Output> {
        self.flag.ensure_active()?;
        log::info!(
            "Aggregating data from {} data source(s)",
            self.sources.len()
        );

        let tasks: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let source = source.clone();
                async move { source.extract().await }
            })
            .collect();

        let outcomes = self.executor.execute(tasks).await?;
        let total = outcomes.len();

        let mut values = Vec::with_capacity(total);
        let mut first_error = None;
        let mut failed = 0;
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(value) => values.push(value),
                Err(e) => {
                    log::warn!("Data source #{} failed: {:#}", index, e);
                    failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        if self.policy.rejects(failed, total) {
            let aggregate = EtlError::AggregateFailed {
                aggregate: "FanInSource",
                failed,
                total,
            };
            return Err(match first_error {
                Some(e) => e.wrap_err(aggregate),
                None => aggregate.into(),
            });
        }

        log::debug!("Drew {} of {} data source(s)", values.len(), total);
        Ok(values)
    }
}

/// Data that can be merged from the parts drawn by several sources
pub trait Gather: Sized {
    fn gather(parts: Vec<Self>) -> Self;
}

impl<T> Gather for Vec<T> {
    fn gather(parts: Vec<Self>) -> Self {
        parts.into_iter().flatten().collect()
    }
}

impl Gather for Value {
    /// Concatenates arrays; any other mix of values becomes an array of the
    /// parts
    fn gather(parts: Vec<Self>) -> Self {
        if parts.iter().all(Value::is_array) {
            Value::Array(
                parts
                    .into_iter()
                    .flat_map(|part| match part {
                        Value::Array(items) => items,
                        other => vec![other],
                    })
                    .collect(),
            )
        } else {
            Value::Array(parts)
        }
    }
}

/// A [`FanInSource`] whose result is merged with [`Gather`]
///
/// Lets an aggregate of `T` sources stand in wherever a single `T` source is
/// expected.
pub struct Gathered<T> {
    inner: FanInSource<T>,
}

impl<T> Gathered<T> {
    pub fn inner(&self) -> &FanInSource<T> {
        &self.inner
    }
}

impl<T: Gather + Send + 'static> Disposable for Gathered<T> {
    fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    fn dispose(&self) {
        self.inner.dispose();
    }
}

#[async_trait]
impl<T: Gather + Send + 'static> Extractor for Gathered<T> {
    type Output = T;

    async fn extract(&self) -> Result<Self::Output> {
        let parts = self
            .inner
            .extract()
            .await
            .wrap_err("Failed to gather data sources")?;
        Ok(T::gather(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::extractor_fn;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn delayed(value: i32, delay_ms: u64) -> SourceRef<i32> {
        Arc::new(extractor_fn(move || async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(value)
        }))
    }

    fn failing(message: &'static str) -> SourceRef<i32> {
        Arc::new(extractor_fn(move || async move {
            Err::<i32, _>(eyre::eyre!(message))
        }))
    }

    #[tokio::test]
    async fn test_results_follow_registration_order() {
        let fan_in = FanInSource::new(vec![
            delayed(1, 40),
            delayed(2, 0),
            delayed(3, 20),
            delayed(4, 10),
        ])
        .unwrap();

        assert_eq!(fan_in.extract().await.unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_fan_in_is_rejected() {
        let err = FanInSource::<i32>::new(Vec::new()).err().unwrap();
        assert!(matches!(err, EtlError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_best_effort_drops_failed_members() {
        let fan_in =
            FanInSource::new(vec![delayed(1, 0), failing("down"), delayed(3, 0)]).unwrap();
        assert_eq!(fan_in.policy(), FailurePolicy::BestEffort);

        assert_eq!(fan_in.extract().await.unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_best_effort_fails_when_all_members_fail() {
        let fan_in = FanInSource::new(vec![failing("a"), failing("b")]).unwrap();

        let err = fan_in.extract().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EtlError>(),
            Some(EtlError::AggregateFailed {
                failed: 2,
                total: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_fail_fast_rejects_partial_failure() {
        let fan_in = FanInSource::new(vec![delayed(1, 0), failing("down")])
            .unwrap()
            .with_policy(FailurePolicy::FailFast);

        let err = fan_in.extract().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EtlError>(),
            Some(EtlError::AggregateFailed { failed: 1, .. })
        ));
        assert_eq!(err.root_cause().to_string(), "down");
    }

    #[tokio::test]
    async fn test_dispose_releases_members() {
        let a = delayed(1, 0);
        let b = delayed(2, 0);
        let fan_in = FanInSource::new(vec![a.clone(), b.clone()]).unwrap();

        fan_in.dispose();
        fan_in.dispose();
        assert!(a.is_disposed());
        assert!(b.is_disposed());

        let err = fan_in.extract().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EtlError>(),
            Some(EtlError::ResourceDisposed { .. })
        ));
    }

    #[tokio::test]
    async fn test_replacement_executor_is_owned() {
        let fan_in = FanInSource::new(vec![delayed(1, 10), delayed(2, 0)])
            .unwrap()
            .with_executor(ConcurrentExecutor::with_max_workers(1).unwrap());
        assert!(!fan_in.executor().is_disposed());

        assert_eq!(fan_in.extract().await.unwrap(), vec![1, 2]);

        fan_in.dispose();
        assert!(fan_in.executor().is_disposed());
    }

    #[tokio::test]
    async fn test_gathered_flattens_vectors() {
        let a: SourceRef<Vec<i32>> = Arc::new(extractor_fn(|| async { Ok(vec![1, 2]) }));
        let b: SourceRef<Vec<i32>> = Arc::new(extractor_fn(|| async { Ok(vec![3]) }));
        let source = FanInSource::new(vec![a, b]).unwrap().gathered();

        assert_eq!(source.extract().await.unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_gather_json_values() {
        let merged = Value::gather(vec![json!([1, 2]), json!([3])]);
        assert_eq!(merged, json!([1, 2, 3]));

        let mixed = Value::gather(vec![json!({"a": 1}), json!([2])]);
        assert_eq!(mixed, json!([{"a": 1}, [2]]));
    }
}
