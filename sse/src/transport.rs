use eventsource_client::{self as es, Client};
use futures_util::future;
use futures_util::stream::{BoxStream, StreamExt};
use log::*;

use crate::error::Error;

/// One message as delivered by the push channel, before any decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    /// SSE `event:` field. `message` when the server did not name the event.
    pub event_type: String,
    pub data: String,
}

impl RawMessage {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            event_type: "message".to_string(),
            data: data.into(),
        }
    }
}

/// What a push channel yields while it is alive.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The server accepted the request; the channel is live even if quiet.
    Opened,
    Message(RawMessage),
}

/// Items of one channel. The stream ends when the channel closes; an `Err`
/// item reports a runtime failure of the channel.
pub type MessageStream = BoxStream<'static, Result<ChannelEvent, Error>>;

/// Opens push channels. The connection owns retry policy, so implementations
/// must not reconnect on their own.
pub trait Transport: Send + Sync {
    fn open(&self, url: &str) -> Result<MessageStream, Error>;
}

/// Server-sent events over HTTP using `eventsource-client`.
#[derive(Debug, Default, Clone)]
pub struct EventSourceTransport {}

impl EventSourceTransport {
    pub fn new() -> Self {
        Self {}
    }
}

impl Transport for EventSourceTransport {
    fn open(&self, url: &str) -> Result<MessageStream, Error> {
        let client = es::ClientBuilder::for_url(url)?
            .reconnect(es::ReconnectOptions::reconnect(false).build())
            .build();

        let stream = client
            .stream()
            .filter_map(|item| {
                future::ready(match item {
                    Ok(es::SSE::Connected(_)) => Some(Ok(ChannelEvent::Opened)),
                    Ok(es::SSE::Event(event)) => Some(Ok(ChannelEvent::Message(RawMessage {
                        event_type: event.event_type,
                        data: event.data,
                    }))),
                    Ok(es::SSE::Comment(_)) => {
                        // Keep-alive comments carry nothing to dispatch
                        trace!("Ignoring SSE comment");
                        None
                    }
                    Err(e) => Some(Err(Error::from(e))),
                })
            })
            .boxed();

        Ok(stream)
    }
}
