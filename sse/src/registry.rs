use dashmap::DashMap;
use events::{Event, EventType};
use log::*;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::Error;

/// Receives dispatched events. Runs synchronously on the dispatch loop, so it
/// must not block.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &Event) -> Result<(), Error>;
}

impl<F> EventHandler for F
where
    F: Fn(&Event) -> Result<(), Error> + Send + Sync,
{
    fn handle(&self, event: &Event) -> Result<(), Error> {
        self(event)
    }
}

pub type HandlerRef = Arc<dyn EventHandler>;

/// Identity of a registered handler: the address of its shared allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct HandlerKey(usize);

impl HandlerKey {
    fn of(handler: &HandlerRef) -> Self {
        Self(Arc::as_ptr(handler) as *const () as usize)
    }
}

/// Event type to handler set mapping.
///
/// A type whose last handler is removed loses its entry entirely, so the
/// registry never accumulates empty sets across subscribe/unsubscribe cycles.
pub struct SubscriptionRegistry {
    handlers: DashMap<EventType, HashMap<HandlerKey, HandlerRef>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Adds `handler` to the set for `event_type`. Adding the same handler
    /// twice keeps a single entry.
    pub fn subscribe(&self, event_type: EventType, handler: HandlerRef) {
        trace!("Subscribing handler to {}", event_type);
        self.handlers
            .entry(event_type)
            .or_default()
            .insert(HandlerKey::of(&handler), handler);
    }

    /// Removes `handler` from the set for `event_type`, dropping the entry once
    /// the set is empty. Returns whether the handler was registered.
    pub fn unsubscribe(&self, event_type: &EventType, handler: &HandlerRef) -> bool {
        let removed = match self.handlers.get_mut(event_type) {
            Some(mut set) => set.remove(&HandlerKey::of(handler)).is_some(),
            None => false,
        };

        self.handlers.remove_if(event_type, |_, set| set.is_empty());
        trace!("Unsubscribed handler from {} (removed: {})", event_type, removed);
        removed
    }

    /// Delivers `event` to every handler registered for its type and returns how
    /// many handled it successfully.
    ///
    /// The handler set is snapshotted first, so handlers may subscribe or
    /// unsubscribe while being dispatched to. A handler that errors or panics is
    /// logged and skipped.
    pub fn dispatch(&self, event: &Event) -> usize {
        let handlers: Vec<HandlerRef> = match self.handlers.get(&event.event_type) {
            Some(set) => set.values().cloned().collect(),
            None => {
                trace!("No subscribers for {}", event.event_type);
                return 0;
            }
        };

        let mut delivered = 0;
        for handler in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!("Handler for {} failed: {}", event.event_type, e);
                }
                Err(_) => {
                    error!("Handler for {} panicked", event.event_type);
                }
            }
        }
        delivered
    }

    pub fn handler_count(&self, event_type: &EventType) -> usize {
        self.handlers
            .get(event_type)
            .map(|set| set.len())
            .unwrap_or(0)
    }

    pub fn has_entry(&self, event_type: &EventType) -> bool {
        self.handlers.contains_key(event_type)
    }

    /// Number of event types with at least one handler.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
