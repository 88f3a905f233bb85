//! Client side of the platform's real-time event stream.
//!
//! Keeps one server-sent events connection open per application, authenticated
//! with a short-lived token, and fans decoded events out to any number of
//! independent subscribers.
//!
//! # Architecture
//!
//! - **TokenProvider**: Exchanges API credentials for a stream token, once per
//!   connection attempt (`POST /events/token`).
//! - **Transport**: Opens the push channel. `EventSourceTransport` speaks SSE over
//!   HTTP; tests substitute an in-memory channel.
//! - **StreamConnection**: Connection state machine. Single channel, single
//!   in-flight attempt, and after any failure exactly one reconnect scheduled
//!   after a fixed delay.
//! - **SubscriptionRegistry**: Event type to handler set. Empty sets are removed;
//!   dispatch isolates every handler from the others.
//! - **EventRouter**: The service object applications hold. Subscribing opens the
//!   connection lazily and returns a `Subscription` disposer.
//!
//! # Message Flow
//!
//! 1. The first `EventRouter::subscribe` calls `connect()`
//! 2. A token is fetched and `GET /events/sse?token=<token>` is opened
//! 3. The open signal marks the connection live and cancels any pending
//!    reconnect
//! 4. Each message is decoded; heartbeats are dropped, malformed payloads are
//!    logged and dropped
//! 5. Every other event is dispatched to the handlers registered for its type
//! 6. On token failure, open failure, stream error or stream end the channel is
//!    discarded and a reconnect is scheduled
//!
//! # Example
//!
//! ```rust,ignore
//! use sse::{ConnectionConfig, EventRouter, EventSourceTransport, HttpTokenProvider};
//!
//! let tokens = HttpTokenProvider::new(base_url, timeout)?.with_bearer_token(api_token);
//! let router = EventRouter::new(
//!     ConnectionConfig::new(base_url),
//!     Arc::new(tokens),
//!     Arc::new(EventSourceTransport::new()),
//! );
//!
//! let _subscription = router.subscribe_fn(JobCategory::Quiz.completed(), |event| {
//!     info!("quiz {:?} ready", event.resource_id);
//!     Ok(())
//! });
//! ```

pub mod connection;
pub mod error;
pub mod message;
pub mod registry;
pub mod router;
pub mod token;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use connection::{ConnectionConfig, ConnectionState, StreamConnection};
pub use error::{Error, ErrorKind};
pub use registry::{EventHandler, HandlerRef, SubscriptionRegistry};
pub use router::{EventRouter, Subscription};
pub use token::{HttpTokenProvider, TokenProvider};
pub use transport::{ChannelEvent, EventSourceTransport, RawMessage, Transport};
