//! Publish/subscribe registry for [`Event`]s.
//!
//! The bus is owned by the process root; every service receives a cloned
//! handle at construction time and subscribes on start. Handlers are stored
//! per [`EventType`] and deduplicated by identity, so re-subscribing the same
//! handler instance is a no-op. `publish` snapshots the subscriber list under
//! a short lock and invokes handlers outside of it, so a handler may safely
//! subscribe or publish without deadlocking.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::{Event, EventKind, EventType};

/// A bus subscriber. Implementations must be cheap and non-blocking; anything
/// slow should forward into a channel and do the work elsewhere.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event);
}

impl<F> EventHandler for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle(&self, event: &Event) {
        self(event)
    }
}

#[derive(Default)]
struct Registry {
    subscribers: HashMap<EventType, Vec<Arc<dyn EventHandler>>>,
}

/// Cloneable handle to the shared event bus.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to each of `types`. Duplicate registration of the
    /// same handler instance for the same type is idempotent.
    pub fn subscribe(&self, types: &[EventType], handler: Arc<dyn EventHandler>) {
        let mut registry = self.registry.lock();
        for ty in types {
            let handlers = registry.subscribers.entry(*ty).or_default();
            if !handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
                handlers.push(Arc::clone(&handler));
            }
        }
    }

    /// Remove `handler` from every type it is registered for.
    pub fn unsubscribe(&self, handler: &Arc<dyn EventHandler>) {
        let mut registry = self.registry.lock();
        for handlers in registry.subscribers.values_mut() {
            handlers.retain(|h| !Arc::ptr_eq(h, handler));
        }
    }

    /// Subscribe via a channel: events of `types` are forwarded into the
    /// returned receiver. Sends to a dropped receiver are ignored.
    pub fn watch(&self, types: &[EventType]) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: Arc<dyn EventHandler> = Arc::new(move |event: &Event| {
            let _ = tx.send(event.clone());
        });
        self.subscribe(types, handler);
        rx
    }

    /// Publish an event built from `sender` and `kind`.
    pub fn publish_from(&self, sender: &'static str, kind: EventKind) {
        self.publish(Event::new(sender, kind));
    }

    /// Publish an event to all subscribers of its type.
    ///
    /// A panicking handler is logged and skipped; it never propagates to the
    /// publisher.
    pub fn publish(&self, event: Event) {
        if !event.skip_logging {
            debug!(sender = event.sender, kind = ?event.kind, "bus event");
        }

        let snapshot: Vec<Arc<dyn EventHandler>> = {
            let registry = self.registry.lock();
            registry
                .subscribers
                .get(&event.kind.event_type())
                .cloned()
                .unwrap_or_default()
        };

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler.handle(&event))).is_err() {
                error!(kind = ?event.kind, "event handler panicked; continuing");
            }
        }
    }

    /// Number of handlers currently registered for `ty`.
    pub fn subscriber_count(&self, ty: EventType) -> usize {
        self.registry
            .lock()
            .subscribers
            .get(&ty)
            .map_or(0, Vec::len)
    }
}
