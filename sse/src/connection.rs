use futures_util::StreamExt;
use log::*;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

use crate::error::Error;
use crate::message::{parse_message, Inbound};
use crate::registry::SubscriptionRegistry;
use crate::token::TokenProvider;
use crate::transport::{ChannelEvent, RawMessage, Transport};

/// Path of the event stream endpoint, relative to the API base URL.
pub const STREAM_PATH: &str = "/events/sse";

/// Fixed delay before reconnecting after a failed or dropped connection.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub base_url: String,
    pub reconnect_delay: Duration,
}

impl ConnectionConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, reconnect_delay: Duration) -> Self {
        self.reconnect_delay = reconnect_delay;
        self
    }
}

/// Builds `<base>/events/sse?token=<token>` with the token query-encoded.
pub fn stream_url(base_url: &str, token: &str) -> Result<Url, Error> {
    let mut url = Url::parse(&format!(
        "{}{}",
        base_url.trim_end_matches('/'),
        STREAM_PATH
    ))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

/// Mutable connection bookkeeping, guarded by a single lock.
#[derive(Default)]
struct Slot {
    state: ConnectionState,
    /// An attempt is between token request and the channel's open signal.
    connecting: bool,
    /// Bumped on every attempt and on disconnect; callbacks from an older
    /// attempt are ignored.
    attempt: u64,
    /// Bumped on disconnect; a reconnect timer from an older session is ignored.
    session: u64,
    /// Reader task of the current channel. Its presence means a channel exists.
    channel: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

struct Inner {
    config: ConnectionConfig,
    tokens: Arc<dyn TokenProvider>,
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriptionRegistry>,
    slot: Mutex<Slot>,
}

/// The single push channel of the application.
///
/// Opens the channel with a fresh token, feeds every decoded event to the
/// subscription registry, and after any failure schedules one reconnect
/// attempt after the configured delay. Dropping it closes the channel and
/// cancels any pending reconnect. Must be used from within a tokio runtime.
pub struct StreamConnection {
    inner: Arc<Inner>,
}

impl StreamConnection {
    pub fn new(
        config: ConnectionConfig,
        tokens: Arc<dyn TokenProvider>,
        transport: Arc<dyn Transport>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                tokens,
                transport,
                registry,
                slot: Mutex::new(Slot::default()),
            }),
        }
    }

    /// Starts a connection attempt in the background unless a channel already
    /// exists or an attempt is in flight.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Cancels any pending reconnect and closes the channel. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let mut slot = self.inner.lock_slot();
        slot.attempt += 1;
        slot.session += 1;

        if let Some(timer) = slot.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(channel) = slot.channel.take() {
            channel.abort();
        }
        slot.connecting = false;

        if slot.state != ConnectionState::Disconnected {
            info!("Event stream disconnected");
        }
        slot.state = ConnectionState::Disconnected;
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock_slot().state
    }

    pub fn is_reconnect_pending(&self) -> bool {
        self.inner.lock_slot().reconnect_timer.is_some()
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Inner {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connect(self: &Arc<Self>) {
        let mut slot = self.lock_slot();
        if slot.connecting || slot.channel.is_some() {
            trace!("Event stream already open or opening");
            return;
        }

        slot.attempt += 1;
        slot.connecting = true;
        slot.state = ConnectionState::Connecting;
        debug!("Connecting event stream at {}", self.config.base_url);

        let inner = Arc::clone(self);
        let attempt = slot.attempt;
        slot.channel = Some(tokio::spawn(async move { inner.run(attempt).await }));
    }

    async fn run(self: Arc<Self>, attempt: u64) {
        let token = match self.tokens.fetch_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to obtain event stream token: {}", e);
                self.fail(attempt);
                return;
            }
        };

        let mut messages = match stream_url(&self.config.base_url, &token)
            .and_then(|url| self.transport.open(url.as_str()))
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Failed to open event stream: {}", e);
                self.fail(attempt);
                return;
            }
        };

        while let Some(item) = messages.next().await {
            match item {
                Ok(ChannelEvent::Opened) => self.opened(attempt),
                Ok(ChannelEvent::Message(message)) => {
                    // A message proves the channel is open even without the signal
                    self.opened(attempt);
                    self.deliver(&message);
                }
                Err(e) => {
                    warn!("Event stream error: {}", e);
                    break;
                }
            }
        }

        debug!("Event stream closed");
        self.fail(attempt);
    }

    fn opened(&self, attempt: u64) {
        let mut slot = self.lock_slot();
        if slot.attempt != attempt || slot.state == ConnectionState::Connected {
            return;
        }

        if let Some(timer) = slot.reconnect_timer.take() {
            timer.abort();
        }
        slot.connecting = false;
        slot.state = ConnectionState::Connected;
        info!("Event stream connected");
    }

    fn deliver(&self, message: &RawMessage) {
        match parse_message(message) {
            Ok(Inbound::Heartbeat) => trace!("Heartbeat received"),
            Ok(Inbound::Event(event)) => {
                let delivered = self.registry.dispatch(&event);
                debug!("Dispatched {} to {} handler(s)", event.event_type, delivered);
            }
            Err(e) => warn!("Dropping malformed event stream message: {}", e),
        }
    }

    fn fail(self: &Arc<Self>, attempt: u64) {
        let mut slot = self.lock_slot();
        if slot.attempt != attempt {
            trace!("Ignoring failure of superseded connection attempt");
            return;
        }

        // Detaches the handle of the task running this very call
        slot.channel = None;
        slot.connecting = false;
        slot.state = ConnectionState::Disconnected;
        self.schedule_reconnect(&mut slot);
    }

    fn schedule_reconnect(self: &Arc<Self>, slot: &mut Slot) {
        if slot.reconnect_timer.is_some() {
            debug!("Reconnect already scheduled");
            return;
        }

        let delay = self.config.reconnect_delay;
        let session = slot.session;
        let inner: Weak<Inner> = Arc::downgrade(self);
        info!("Reconnecting event stream in {:?}", delay);

        slot.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            {
                let mut slot = inner.lock_slot();
                if slot.session != session {
                    return;
                }
                slot.reconnect_timer = None;
            }
            inner.connect();
        }));
    }
}
