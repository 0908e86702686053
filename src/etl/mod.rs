//! Core ETL (Extract, Transform, Load) abstractions
//!
//! This module provides the stage traits every workflow is built from,
//! adapters that lift plain functions into stages, and the composite
//! aggregators that fan many sources into one or one value out to many
//! sinks.

mod extract;
mod fan_in;
mod fan_out;
mod load;
mod transform;

use serde::Deserialize;
use std::sync::Arc;

pub use extract::{Extractor, FnExtractor, extractor_fn};
pub use fan_in::{FanInSource, Gather, Gathered};
pub use fan_out::FanOutSink;
pub use load::{FnLoader, Loader, NullSink, loader_fn};
pub use transform::{FnTransformer, IdentityTransformer, ProcessorChain, Transformer, transformer_fn};

/// Shared handle to a data source
pub type SourceRef<T> = Arc<dyn Extractor<Output = T>>;

/// Shared handle to a data processor
pub type ProcessorRef<T, U> = Arc<dyn Transformer<Input = T, Output = U>>;

/// Shared handle to a data sink
pub type SinkRef<T> = Arc<dyn Loader<Input = T>>;

/// What an aggregate does when some of its members fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep the results of the members that succeeded; fail only when every
    /// member failed
    #[default]
    BestEffort,
    /// Fail the aggregate if any member failed, after every dispatched
    /// member has finished
    FailFast,
}

impl FailurePolicy {
    /// Decide whether `failed` failures out of `total` members fail the aggregate
    pub fn rejects(self, failed: usize, total: usize) -> bool {
        match self {
            Self::BestEffort => failed > 0 && failed == total,
            Self::FailFast => failed > 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_effort_only_rejects_total_failure() {
        let policy = FailurePolicy::BestEffort;
        assert!(!policy.rejects(0, 3));
        assert!(!policy.rejects(2, 3));
        assert!(policy.rejects(3, 3));
    }

    #[test]
    fn test_fail_fast_rejects_any_failure() {
        let policy = FailurePolicy::FailFast;
        assert!(!policy.rejects(0, 3));
        assert!(policy.rejects(1, 3));
    }

    #[test]
    fn test_policy_deserializes_snake_case() {
        let policy: FailurePolicy = serde_json::from_str("\"fail_fast\"").unwrap();
        assert_eq!(policy, FailurePolicy::FailFast);
    }
}
