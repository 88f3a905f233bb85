use events::{Event, EventType};
use log::*;
use std::sync::{Arc, Weak};

use crate::connection::{ConnectionConfig, ConnectionState, StreamConnection};
use crate::error::Error;
use crate::registry::{HandlerRef, SubscriptionRegistry};
use crate::token::TokenProvider;
use crate::transport::Transport;

/// Application-wide entry point to the event stream.
///
/// Owns the single `StreamConnection` and the subscription registry it feeds.
/// Construct one at startup and share it with whatever needs events; the first
/// subscription opens the connection.
pub struct EventRouter {
    registry: Arc<SubscriptionRegistry>,
    connection: StreamConnection,
}

impl EventRouter {
    pub fn new(
        config: ConnectionConfig,
        tokens: Arc<dyn TokenProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let connection = StreamConnection::new(config, tokens, transport, Arc::clone(&registry));
        Self {
            registry,
            connection,
        }
    }

    /// Registers `handler` for `event_type`, opening the connection if none exists.
    pub fn subscribe(&self, event_type: EventType, handler: HandlerRef) -> Subscription {
        self.connection.connect();
        self.registry.subscribe(event_type.clone(), Arc::clone(&handler));
        debug!("Subscribed to {}", event_type);

        Subscription {
            registry: Arc::downgrade(&self.registry),
            event_type,
            handler: Some(handler),
        }
    }

    /// Registers a closure as handler for `event_type`.
    pub fn subscribe_fn<F>(&self, event_type: EventType, handler: F) -> Subscription
    where
        F: Fn(&Event) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.subscribe(event_type, Arc::new(handler))
    }

    /// Removes `handler` from `event_type`. The connection stays open for
    /// any other subscribers.
    pub fn unsubscribe(&self, event_type: &EventType, handler: &HandlerRef) -> bool {
        self.registry.unsubscribe(event_type, handler)
    }

    /// Delivers `event` to its subscribers as if it had arrived on the stream.
    pub fn dispatch(&self, event: &Event) -> usize {
        self.registry.dispatch(event)
    }

    pub fn connect(&self) {
        self.connection.connect();
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_reconnect_pending(&self) -> bool {
        self.connection.is_reconnect_pending()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }
}

/// Disposer returned by [`EventRouter::subscribe`].
///
/// Unsubscribes when `unsubscribe` is called or when dropped, whichever comes
/// first.
pub struct Subscription {
    registry: Weak<SubscriptionRegistry>,
    event_type: EventType,
    handler: Option<HandlerRef>,
}

impl Subscription {
    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn is_active(&self) -> bool {
        self.handler.is_some()
    }

    pub fn unsubscribe(&mut self) {
        let Some(handler) = self.handler.take() else {
            return;
        };
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(&self.event_type, &handler);
            debug!("Unsubscribed from {}", self.event_type);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
