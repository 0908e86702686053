//! Transformer trait for data transformation

use super::ProcessorRef;
use crate::disposable::{Disposable, DisposeFlag};
use crate::error::EtlError;
use eyre::Result;
use std::marker::PhantomData;

/// Transformer trait for mapping extracted data into loadable data
///
/// Implementors define how data is processed:
/// - Data cleaning (removing fields)
/// - Data enrichment (adding fields)
/// - Format conversion
/// - Validation
///
/// A transformer has no ownership over its input beyond the call.
///
/// # Example
/// ```
/// use etl_runtime::disposable::{Disposable, DisposeFlag};
/// use etl_runtime::etl::Transformer;
/// use eyre::Result;
///
/// struct Doubler {
///     flag: DisposeFlag,
/// }
///
/// impl Disposable for Doubler {
///     fn is_disposed(&self) -> bool {
///         self.flag.is_set()
///     }
///
///     fn dispose(&self) {
///         self.flag.set();
///     }
/// }
///
/// impl Transformer for Doubler {
///     type Input = i64;
///     type Output = i64;
///
///     fn transform(&self, input: Self::Input) -> Result<Self::Output> {
///         self.flag.ensure_active()?;
///         Ok(input * 2)
///     }
/// }
/// ```
pub trait Transformer: Disposable {
    /// Input data type
    type Input: Send;

    /// Output data type after transformation
    type Output: Send;

    /// Transform a value
    ///
    /// # Errors
    /// Returns an error if the transformer is disposed or the transformation
    /// fails (validation, conversion, etc.)
    fn transform(&self, input: Self::Input) -> Result<Self::Output>;
}

/// Identity transformer that passes data through unchanged
///
/// This is the default processor used by the workflow builder when no
/// processor is registered.
pub struct IdentityTransformer<T> {
    flag: DisposeFlag,
    _phantom: PhantomData<fn(T) -> T>,
}

impl<T> Default for IdentityTransformer<T> {
    fn default() -> Self {
        Self {
            flag: DisposeFlag::new("IdentityTransformer"),
            _phantom: PhantomData,
        }
    }
}

impl<T> IdentityTransformer<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> Disposable for IdentityTransformer<T> {
    fn is_disposed(&self) -> bool {
        self.flag.is_set()
    }

    fn dispose(&self) {
        if self.flag.set() {
            log::debug!("IdentityTransformer disposal complete");
        }
    }
}

impl<T: Send> Transformer for IdentityTransformer<T> {
    type Input = T;
    type Output = T;

    fn transform(&self, input: Self::Input) -> Result<Self::Output> {
        self.flag.ensure_active()?;
        log::debug!("Skipping data processing, returning input as is");
        Ok(input)
    }
}

/// Transformer backed by a plain function
///
/// Created with [`transformer_fn`].
pub struct FnTransformer<F, T> {
    f: F,
    flag: DisposeFlag,
    _input: PhantomData<fn(T)>,
}

/// Lift a single-argument function into a [`Transformer`]
///
/// # Example
/// ```
/// use etl_runtime::etl::{Transformer, transformer_fn};
///
/// let upper = transformer_fn(|s: String| Ok(s.to_uppercase()));
/// assert_eq!(upper.transform("abc".to_string()).unwrap(), "ABC");
/// ```
pub fn transformer_fn<T, U, F>(f: F) -> FnTransformer<F, T>
where
    F: Fn(T) -> Result<U> + Send + Sync,
    T: Send,
    U: Send,
{
    FnTransformer {
        f,
        flag: DisposeFlag::new("FnTransformer"),
        _input: PhantomData,
    }
}

impl<F: Send + Sync, T> Disposable for FnTransformer<F, T> {
    fn is_disposed(&self) -> bool {
        self.flag.is_set()
    }

    fn dispose(&self) {
        if self.flag.set() {
            log::debug!("FnTransformer disposal complete");
        }
    }
}

impl<T, U, F> Transformer for FnTransformer<F, T>
where
    F: Fn(T) -> Result<U> + Send + Sync,
    T: Send,
    U: Send,
{
    type Input = T;
    type Output = U;

    fn transform(&self, input: Self::Input) -> Result<Self::Output> {
        self.flag.ensure_active()?;
        log::debug!("Processing data using {}", std::any::type_name::<F>());
        (self.f)(input)
    }
}

/// Runs same-typed processors one after the other in registration order
///
/// Owns its members: disposing the chain disposes every processor in it.
pub struct ProcessorChain<T> {
    processors: Vec<ProcessorRef<T, T>>,
    flag: DisposeFlag,
}

impl<T: Send + 'static> ProcessorChain<T> {
    /// Create a chain from at least one processor
    ///
    /// # Errors
    /// Returns a configuration error if `processors` is empty.
    pub fn new(processors: Vec<ProcessorRef<T, T>>) -> Result<Self, EtlError> {
        if processors.is_empty() {
            return Err(EtlError::configuration(
                "a processor chain requires at least one processor",
            ));
        }
        Ok(Self {
            processors,
            flag: DisposeFlag::new("ProcessorChain"),
        })
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl<T: Send + 'static> Disposable for ProcessorChain<T> {
    fn is_disposed(&self) -> bool {
        self.flag.is_set()
    }

    fn dispose(&self) {
        if self.flag.set() {
            for processor in &self.processors {
                processor.dispose();
            }
            log::debug!("ProcessorChain disposal complete");
        }
    }
}

impl<T: Send + 'static> Transformer for ProcessorChain<T> {
    type Input = T;
    type Output = T;

    fn transform(&self, input: Self::Input) -> Result<Self::Output> {
        self.flag.ensure_active()?;
        self.processors
            .iter()
            .try_fold(input, |data, processor| processor.transform(data))
    }
}
