//! Resource lifecycle contract
//!
//! Every pipeline stage is a [`Disposable`]: it can be explicitly released,
//! releasing twice is a no-op, and any operation on a released resource must
//! fail with [`EtlError::ResourceDisposed`] instead of running partially.
//!
//! [`DisposalScope`] tracks a set of acquired resources and releases them in
//! reverse acquisition order when closed or dropped, so cleanup happens on
//! every exit path including early returns and panics.

use crate::error::EtlError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A resource with an explicit, idempotent release
pub trait Disposable: Send + Sync {
    /// Whether [`dispose`](Disposable::dispose) has been called
    fn is_disposed(&self) -> bool;

    /// Release the resource and everything it owns
    ///
    /// Must be safe to call more than once. Must not panic; cleanup problems
    /// are logged, never raised.
    fn dispose(&self);

    /// Check that the resource can still be used
    ///
    /// Called by consumers before they take ownership of a resource for the
    /// duration of a scope.
    fn acquire(&self) -> Result<(), EtlError> {
        if self.is_disposed() {
            return Err(EtlError::disposed(std::any::type_name::<Self>()));
        }
        Ok(())
    }
}

/// Thread-safe "disposed" flag shared by resource implementations
#[derive(Debug)]
pub struct DisposeFlag {
    resource: &'static str,
    disposed: AtomicBool,
}

impl DisposeFlag {
    /// Create a flag for the named resource (used in error messages)
    pub const fn new(resource: &'static str) -> Self {
        Self {
            resource,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn is_set(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Mark the resource disposed
    ///
    /// Returns `true` only for the call that actually flipped the flag, so
    /// callers can release owned state exactly once.
    pub fn set(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }

    /// Fail with [`EtlError::ResourceDisposed`] if the flag is set
    pub fn ensure_active(&self) -> Result<(), EtlError> {
        if self.is_set() {
            return Err(EtlError::disposed(self.resource));
        }
        Ok(())
    }

    pub fn resource(&self) -> &'static str {
        self.resource
    }
}

/// Stacked deferred-release list
///
/// Resources pushed with [`acquire`](DisposalScope::acquire) are disposed in
/// reverse order by [`close`](DisposalScope::close), or on drop if the scope
/// is abandoned.
#[derive(Default)]
pub struct DisposalScope {
    resources: Vec<Arc<dyn Disposable>>,
}

impl DisposalScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a resource into this scope
    ///
    /// If the resource is already disposed nothing is pushed and the error
    /// is returned; resources acquired earlier stay in the scope and are
    /// still released when it closes.
    pub fn acquire(&mut self, resource: Arc<dyn Disposable>) -> Result<(), EtlError> {
        resource.acquire()?;
        self.resources.push(resource);
        Ok(())
    }

    /// Register an already-checked resource for release
    pub fn push(&mut self, resource: Arc<dyn Disposable>) {
        self.resources.push(resource);
    }

    /// Number of resources still held by the scope
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Release every held resource, last acquired first
    pub fn close(&mut self) {
        while let Some(resource) = self.resources.pop() {
            resource.dispose();
        }
    }
}

impl Drop for DisposalScope {
    fn drop(&mut self) {
        if !self.resources.is_empty() {
            log::debug!(
                "Releasing {} resource(s) from an unclosed scope",
                self.resources.len()
            );
        }
        self.close();
    }
}
