//! Error types for the `sse` crate.
//!
//! A root `Error` struct carries an error kind and an optional source for chaining.
//! None of these errors are fatal: connection errors feed the reconnect path,
//! message and handler errors are logged and the offending item is dropped.

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in the event stream client.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Token(TokenErrorKind),
    Channel(ChannelErrorKind),
    Message(MessageErrorKind),
    Handler(HandlerErrorKind),
}

/// Errors from requesting a stream-authentication token.
#[derive(Debug, PartialEq)]
pub enum TokenErrorKind {
    Network,
    Rejected(u16),
    InvalidResponse,
}

/// Errors from opening or reading the push channel.
#[derive(Debug, PartialEq)]
pub enum ChannelErrorKind {
    InvalidUrl,
    OpenFailed,
    Stream,
}

/// Errors from decoding a single inbound message.
#[derive(Debug, PartialEq)]
pub enum MessageErrorKind {
    InvalidJson,
    InvalidEvent,
}

/// Errors reported by event handlers during dispatch.
#[derive(Debug, PartialEq)]
pub enum HandlerErrorKind {
    MissingField,
    Failed,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Token(kind) => write!(f, "Stream token error: {:?}", kind)?,
            ErrorKind::Channel(kind) => write!(f, "Event channel error: {:?}", kind)?,
            ErrorKind::Message(kind) => write!(f, "Event message error: {:?}", kind)?,
            ErrorKind::Handler(kind) => write!(f, "Event handler error: {:?}", kind)?,
        }
        if let Some(source) = &self.source {
            write!(f, " ({})", source)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = if err.is_decode() {
            ErrorKind::Token(TokenErrorKind::InvalidResponse)
        } else if let Some(status) = err.status() {
            ErrorKind::Token(TokenErrorKind::Rejected(status.as_u16()))
        } else {
            ErrorKind::Token(TokenErrorKind::Network)
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<eventsource_client::Error> for Error {
    fn from(err: eventsource_client::Error) -> Self {
        Error {
            source: Some(err.to_string().into()),
            error_kind: ErrorKind::Channel(ChannelErrorKind::Stream),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Channel(ChannelErrorKind::InvalidUrl),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Message(MessageErrorKind::InvalidJson),
        }
    }
}

/// Helper function to create token errors.
pub fn token_error(kind: TokenErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Token(kind),
    }
}

/// Helper function to create channel errors.
pub fn channel_error(kind: ChannelErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Channel(kind),
    }
}

/// Helper function to create message errors.
pub fn message_error(kind: MessageErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Message(kind),
    }
}

/// Helper function to create handler errors.
pub fn handler_error(kind: HandlerErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Handler(kind),
    }
}

/// Shorthand for a handler error caused by an event missing a field its type requires.
pub fn missing_field(event_type: &events::EventType, field: &str) -> Error {
    handler_error(
        HandlerErrorKind::MissingField,
        &format!("{event_type} event without {field}"),
    )
}
