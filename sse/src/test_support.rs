//! In-memory doubles for the token endpoint and the push channel.
//!
//! Lets connection and consumer tests drive the stream message by message
//! without a server.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

use crate::error::{channel_error, token_error, ChannelErrorKind, Error, TokenErrorKind};
use crate::token::TokenProvider;
use crate::transport::{ChannelEvent, MessageStream, RawMessage, Transport};

/// Lets spawned connection tasks run until they are waiting on I/O again.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Hands out a fixed token, or fails while switched to failing.
pub struct TestTokenProvider {
    token: String,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl TestTokenProvider {
    pub fn succeeding(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        let provider = Self::succeeding("test-token");
        provider.set_failing(true);
        provider
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of token requests made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for TestTokenProvider {
    async fn fetch_token(&self) -> Result<String, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(token_error(TokenErrorKind::Network, "token endpoint unreachable"))
        } else {
            Ok(self.token.clone())
        }
    }
}

#[derive(Default)]
struct ChannelState {
    opened_urls: Vec<String>,
    current: Option<UnboundedSender<Result<ChannelEvent, Error>>>,
    fail_open: bool,
}

/// Transport whose channels are fed from the test. Each `open` replaces the
/// channel that `send`, `fail` and `close` act on, and signals the new
/// channel as opened right away.
#[derive(Clone, Default)]
pub struct ChannelTransport {
    state: Arc<Mutex<ChannelState>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_open(&self, fail_open: bool) {
        self.state.lock().unwrap().fail_open = fail_open;
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.state.lock().unwrap().opened_urls.clone()
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opened_urls.len()
    }

    /// Pushes one message with the given data onto the current channel.
    /// Returns false if no channel is open to receive it.
    pub fn send(&self, data: &str) -> bool {
        self.push(Ok(ChannelEvent::Message(RawMessage::new(data))))
    }

    /// Reports a runtime failure on the current channel.
    pub fn fail(&self, message: &str) -> bool {
        self.push(Err(channel_error(ChannelErrorKind::Stream, message)))
    }

    /// Ends the current channel's stream.
    pub fn close(&self) {
        self.state.lock().unwrap().current = None;
    }

    fn push(&self, item: Result<ChannelEvent, Error>) -> bool {
        match &self.state.lock().unwrap().current {
            Some(sender) => sender.send(item).is_ok(),
            None => false,
        }
    }
}

impl Transport for ChannelTransport {
    fn open(&self, url: &str) -> Result<MessageStream, Error> {
        let mut state = self.state.lock().unwrap();
        if state.fail_open {
            return Err(channel_error(ChannelErrorKind::OpenFailed, "refused"));
        }

        let (sender, receiver) = unbounded_channel();
        let _ = sender.send(Ok(ChannelEvent::Opened));
        state.opened_urls.push(url.to_string());
        state.current = Some(sender);

        let messages = stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|item| (item, receiver))
        });
        Ok(messages.boxed())
    }
}
