use events::Event;
use serde_json::Value;

use crate::error::{message_error, Error, MessageErrorKind};
use crate::transport::RawMessage;

/// Type tag of liveness pings, both as SSE event name and as JSON `type` field.
pub const HEARTBEAT: &str = "heartbeat";

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Liveness ping with no domain meaning.
    Heartbeat,
    Event(Box<Event>),
}

/// Decodes one raw channel message.
///
/// Accepts the event object either as the message data itself or wrapped in a
/// `{"data": ...}` envelope.
pub fn parse_message(message: &RawMessage) -> Result<Inbound, Error> {
    if message.event_type == HEARTBEAT {
        return Ok(Inbound::Heartbeat);
    }

    let mut payload: Value = serde_json::from_str(&message.data)?;
    if payload.get("eventType").is_none() {
        let envelope = match payload.get_mut("data") {
            Some(inner) if inner.is_object() => Some(inner.take()),
            _ => None,
        };
        if let Some(inner) = envelope {
            payload = inner;
        }
    }

    if is_heartbeat(&payload) {
        return Ok(Inbound::Heartbeat);
    }

    let event = serde_json::from_value::<Event>(payload)
        .map_err(|e| message_error(MessageErrorKind::InvalidEvent, &e.to_string()))?;
    Ok(Inbound::Event(Box::new(event)))
}

fn is_heartbeat(payload: &Value) -> bool {
    payload.get("type").and_then(Value::as_str) == Some(HEARTBEAT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use events::{EventType, JobCategory};

    #[test]
    fn test_heartbeat_payload_is_recognized() {
        let parsed = parse_message(&RawMessage::new(r#"{"type":"heartbeat"}"#)).unwrap();
        assert_eq!(parsed, Inbound::Heartbeat);
    }

    #[test]
    fn test_wrapped_heartbeat_is_recognized() {
        let parsed = parse_message(&RawMessage::new(r#"{"data":{"type":"heartbeat"}}"#)).unwrap();
        assert_eq!(parsed, Inbound::Heartbeat);
    }

    #[test]
    fn test_heartbeat_event_name_is_recognized_without_parsing() {
        let message = RawMessage {
            event_type: HEARTBEAT.to_string(),
            data: String::new(),
        };
        assert_eq!(parse_message(&message).unwrap(), Inbound::Heartbeat);
    }

    #[test]
    fn test_event_payload_is_decoded() {
        let parsed = parse_message(&RawMessage::new(
            r#"{"eventType":"flashcard.failed","userId":"u1","jobId":"j1","error":"boom"}"#,
        ))
        .unwrap();

        match parsed {
            Inbound::Event(event) => {
                assert_eq!(
                    event.event_type,
                    EventType::JobFailed(JobCategory::Flashcard)
                );
                assert_eq!(event.error.as_deref(), Some("boom"));
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn test_wrapped_event_payload_is_decoded() {
        let parsed = parse_message(&RawMessage::new(
            r#"{"data":{"eventType":"summary.completed","userId":"u1","jobId":"j1"}}"#,
        ))
        .unwrap();
        assert!(matches!(parsed, Inbound::Event(event)
            if event.event_type == EventType::JobCompleted(JobCategory::Summary)));
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let err = parse_message(&RawMessage::new("{not json")).unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::Message(MessageErrorKind::InvalidJson)
        );
    }

    #[test]
    fn test_json_that_is_not_an_event_is_an_error() {
        let err = parse_message(&RawMessage::new(r#"{"hello":"world"}"#)).unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::Message(MessageErrorKind::InvalidEvent)
        );
    }
}
