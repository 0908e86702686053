//! Extractor trait for data extraction from various sources

use crate::disposable::{Disposable, DisposeFlag};
use async_trait::async_trait;
use eyre::Result;
use std::future::Future;

/// Extractor trait for drawing data from a source
///
/// Implementors define how to obtain raw data from sources like:
/// - Databases and warehouses
/// - File systems
/// - Remote APIs
///
/// Every extractor is [`Disposable`]. Implementations must check their
/// disposed state before doing any work and fail with
/// [`EtlError::ResourceDisposed`](crate::EtlError::ResourceDisposed).
///
/// # Example
/// ```no_run
/// use etl_runtime::disposable::{Disposable, DisposeFlag};
/// use etl_runtime::etl::Extractor;
/// use async_trait::async_trait;
/// use eyre::Result;
/// use std::path::PathBuf;
///
/// struct FileExtractor {
///     path: PathBuf,
///     flag: DisposeFlag,
/// }
///
/// impl Disposable for FileExtractor {
///     fn is_disposed(&self) -> bool {
///         self.flag.is_set()
///     }
///
///     fn dispose(&self) {
///         self.flag.set();
///     }
/// }
///
/// #[async_trait]
/// impl Extractor for FileExtractor {
///     type Output = String;
///
///     async fn extract(&self) -> Result<Self::Output> {
///         self.flag.ensure_active()?;
///         Ok(std::fs::read_to_string(&self.path)?)
///     }
/// }
/// ```
#[async_trait]
pub trait Extractor: Disposable {
    /// The type of data drawn from the source
    type Output: Send;

    /// Draw data from the source
    ///
    /// # Errors
    /// Returns an error if the extractor is disposed or extraction fails
    /// (network, I/O, parsing, etc.)
    async fn extract(&self) -> Result<Self::Output>;
}

/// Extractor backed by a plain async function
///
/// Created with [`extractor_fn`]. Disposal only flips the guard flag.
pub struct FnExtractor<F> {
    f: F,
    flag: DisposeFlag,
}

/// Lift a zero-argument async function into an [`Extractor`]
///
/// # Example
/// ```
/// use etl_runtime::etl::{Extractor, extractor_fn};
///
/// # async fn example() -> eyre::Result<()> {
/// let source = extractor_fn(|| async { Ok(vec![1, 2, 3]) });
/// assert_eq!(source.extract().await?, vec![1, 2, 3]);
/// # Ok(())
/// # }
/// ```
pub fn extractor_fn<T, F, Fut>(f: F) -> FnExtractor<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    FnExtractor {
        f,
        flag: DisposeFlag::new("FnExtractor"),
    }
}

impl<F: Send + Sync> Disposable for FnExtractor<F> {
    fn is_disposed(&self) -> bool {
        self.flag.is_set()
    }

    fn dispose(&self) {
        if self.flag.set() {
            log::debug!("FnExtractor disposal complete");
        }
    }
}

#[async_trait]
impl<T, F, Fut> Extractor for FnExtractor<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    async fn extract(&self) -> Result<Self::Output> {
        self.flag.ensure_active()?;
        log::debug!("Drawing data from {}", std::any::type_name::<F>());
        (self.f)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;

    #[tokio::test]
    async fn test_fn_extractor_draws() {
        let source = extractor_fn(|| async { Ok("raw") });
        assert_eq!(source.extract().await.unwrap(), "raw");
    }

    #[tokio::test]
    async fn test_fn_extractor_after_dispose() {
        let source = extractor_fn(|| async { Ok(1) });
        source.dispose();
        source.dispose();
        assert!(source.is_disposed());

        let err = source.extract().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EtlError>(),
            Some(EtlError::ResourceDisposed { .. })
        ));
    }
}
