//! Typed synchronous event bus

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Marker for values that can be published on an [`EventBus`]
pub trait Event: Any + Send + Sync {}

type Handler = Arc<dyn Fn(&dyn Any) + Send + Sync>;

struct Entry {
    id: u64,
    handler: Handler,
}

/// Handle returned by [`EventBus::connect`]
///
/// The subscription stays active until it is passed to
/// [`EventBus::disconnect`] or the bus is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
    event: TypeId,
}

/// Synchronous publish/subscribe bus keyed by event type
///
/// [`send`](EventBus::send) delivers on the calling thread, in registration
/// order, to every handler connected for exactly that event type. A
/// panicking handler propagates to the sender.
pub struct EventBus {
    handlers: RwLock<HashMap<TypeId, Vec<Entry>>>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a handler for events of type `E`
    pub fn connect<E, F>(&self, handler: F) -> Subscription
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let type_id = TypeId::of::<E>();
        let handler: Handler = Arc::new(move |event: &dyn Any| {
            if let Some(event) = event.downcast_ref::<E>() {
                handler(event);
            }
        });

        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(type_id)
            .or_default()
            .push(Entry { id, handler });

        Subscription { id, event: type_id }
    }

    /// Remove a handler, returning `false` if it was already removed
    pub fn disconnect(&self, subscription: Subscription) -> bool {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = handlers.get_mut(&subscription.event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != subscription.id);
        before != entries.len()
    }

    /// Deliver `event` to every handler connected for its type
    pub fn send<E: Event>(&self, event: &E) {
        // Handlers run outside the lock so they can connect or disconnect
        let snapshot: Vec<Handler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<E>())
            .map(|entries| entries.iter().map(|e| e.handler.clone()).collect())
            .unwrap_or_default();

        for handler in snapshot {
            handler(event as &dyn Any);
        }
    }

    /// Number of handlers connected for events of type `E`
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }
}
