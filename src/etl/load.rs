//! Loader trait for loading data to destinations

use crate::disposable::{Disposable, DisposeFlag};
use async_trait::async_trait;
use eyre::Result;
use std::future::Future;
use std::marker::PhantomData;

/// Loader trait for draining processed data into a destination
///
/// Implementors define how data is consumed:
/// - Object storage and file systems
/// - Databases
/// - Remote APIs
///
/// A loader returns nothing; its only contract is the side effect.
///
/// # Example
/// ```no_run
/// use etl_runtime::disposable::{Disposable, DisposeFlag};
/// use etl_runtime::etl::Loader;
/// use async_trait::async_trait;
/// use eyre::Result;
/// use std::path::PathBuf;
///
/// struct FileLoader {
///     output: PathBuf,
///     flag: DisposeFlag,
/// }
///
/// impl Disposable for FileLoader {
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
/// impl Loader for FileLoader {
///     type Input = String;
///
///     async fn load(&self, input: Self::Input) -> Result<()> {
///         self.flag.ensure_active()?;
///         std::fs::write(&self.output, input)?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Loader: Disposable {
    /// The type of data consumed
    type Input: Send;

    /// Consume data into the destination
    ///
    /// # Errors
    /// Returns an error if the loader is disposed or loading fails
    /// (network, I/O, validation, etc.)
    async fn load(&self, input: Self::Input) -> Result<()>;
}

/// Loader that discards everything it receives
///
/// This is the default sink used by the workflow builder when no sink is
/// registered.
pub struct NullSink<T> {
    flag: DisposeFlag,
    _phantom: PhantomData<fn(T)>,
}

impl<T> Default for NullSink<T> {
    fn default() -> Self {
        Self {
            flag: DisposeFlag::new("NullSink"),
            _phantom: PhantomData,
        }
    }
}

impl<T> NullSink<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> Disposable for NullSink<T> {
    fn is_disposed(&self) -> bool {
        self.flag.is_set()
    }

    fn dispose(&self) {
        if self.flag.set() {
            log::debug!("NullSink disposal complete");
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Loader for NullSink<T> {
    type Input = T;

    async fn load(&self, _input: Self::Input) -> Result<()> {
        self.flag.ensure_active()?;
        log::debug!("Discarding processed data");
        Ok(())
    }
}

/// Loader backed by a plain async function
///
/// Created with [`loader_fn`].
pub struct FnLoader<F, T> {
    f: F,
    flag: DisposeFlag,
    _input: PhantomData<fn(T)>,
}

/// Lift a single-argument async function into a [`Loader`]
///
/// # Example
/// ```
/// use etl_runtime::etl::{Loader, loader_fn};
/// use std::sync::{Arc, Mutex};
///
/// # async fn example() -> eyre::Result<()> {
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = {
///     let seen = seen.clone();
///     loader_fn(move |value: i32| {
///         let seen = seen.clone();
///         async move {
///             seen.lock().unwrap().push(value);
///             Ok(())
///         }
///     })
/// };
/// sink.load(7).await?;
/// assert_eq!(*seen.lock().unwrap(), vec![7]);
/// # Ok(())
/// # }
/// ```
pub fn loader_fn<T, F, Fut>(f: F) -> FnLoader<F, T>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
    T: Send + 'static,
{
    FnLoader {
        f,
        flag: DisposeFlag::new("FnLoader"),
        _input: PhantomData,
    }
}

impl<F: Send + Sync, T> Disposable for FnLoader<F, T> {
    fn is_disposed(&self) -> bool {
        self.flag.is_set()
    }

    fn dispose(&self) {
        if self.flag.set() {
            log::debug!("FnLoader disposal complete");
        }
    }
}

#[async_trait]
impl<T, F, Fut> Loader for FnLoader<F, T>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
    T: Send + 'static,
{
    type Input = T;

    async fn load(&self, input: Self::Input) -> Result<()> {
        self.flag.ensure_active()?;
        log::debug!("Draining data to {}", std::any::type_name::<F>());
        (self.f)(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use serde_json::json;

    #[tokio::test]
    async fn test_null_sink_discards_anything() {
        let sink = NullSink::<serde_json::Value>::new();
        sink.load(json!({"x": 1})).await.unwrap();
        sink.load(json!(null)).await.unwrap();

        let strings = NullSink::<String>::new();
        strings.load(String::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_fn_loader_after_dispose() {
        let sink = loader_fn(|_: i32| async { Ok(()) });
        sink.load(1).await.unwrap();

        sink.dispose();
        sink.dispose();
        let err = sink.load(2).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EtlError>(),
            Some(EtlError::ResourceDisposed { .. })
        ));
    }
}
