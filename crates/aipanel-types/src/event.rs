//! Events carried by an agent chat stream.

use std::fmt;

use serde_json::{Map, Value};

/// Discriminator field present on every event object.
pub const KIND_FIELD: &str = "type";

/// One decoded event from a chat stream.
///
/// Only `error` and `done` are interpreted by the client. Every other kind is
/// passed through with its raw payload, so kinds introduced by the server
/// (`text_delta`, `tool_call`, ...) need no client change.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// The run failed; `message` is human-readable.
    Error { message: String },
    /// Normal end of stream. Both fields are unset when the client
    /// synthesizes the event after the connection closed.
    Done {
        session_id: Option<String>,
        token_estimate: Option<u64>,
    },
    /// Any other kind, with the full decoded object (including `type`).
    Other {
        kind: String,
        payload: Map<String, Value>,
    },
}

/// Reasons a decoded JSON value is not a usable event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventParseError {
    /// The value is valid JSON but not an object.
    NotAnObject,
    /// The object has no string `type` field.
    MissingKind,
}

impl fmt::Display for EventParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventParseError::NotAnObject => write!(f, "event payload is not a JSON object"),
            EventParseError::MissingKind => write!(f, "event payload has no string `type` field"),
        }
    }
}

impl std::error::Error for EventParseError {}

impl ChatEvent {
    pub const ERROR: &'static str = "error";
    pub const DONE: &'static str = "done";

    pub fn error(message: impl Into<String>) -> Self {
        ChatEvent::Error {
            message: message.into(),
        }
    }

    /// The `done` event the client emits when the server closes the
    /// connection without sending one.
    pub fn done() -> Self {
        ChatEvent::Done {
            session_id: None,
            token_estimate: None,
        }
    }

    /// Interprets a decoded JSON value as an event.
    ///
    /// # Errors
    /// Returns an error if the value is not an object or lacks a string
    /// `type` discriminator.
    pub fn from_value(value: Value) -> Result<Self, EventParseError> {
        let Value::Object(payload) = value else {
            return Err(EventParseError::NotAnObject);
        };
        let kind = payload
            .get(KIND_FIELD)
            .and_then(Value::as_str)
            .ok_or(EventParseError::MissingKind)?;

        match kind {
            Self::ERROR => {
                let message = payload
                    .get("error")
                    .and_then(Value::as_str)
                    .or_else(|| payload.get("message").and_then(Value::as_str))
                    .unwrap_or("Unknown error");
                Ok(ChatEvent::error(message))
            }
            Self::DONE => Ok(ChatEvent::Done {
                session_id: payload
                    .get("sessionId")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
                token_estimate: payload.get("tokenEstimate").and_then(Value::as_u64),
            }),
            _ => Ok(ChatEvent::Other {
                kind: kind.to_string(),
                payload,
            }),
        }
    }

    /// Returns the discriminator of this event.
    pub fn kind(&self) -> &str {
        match self {
            ChatEvent::Error { .. } => Self::ERROR,
            ChatEvent::Done { .. } => Self::DONE,
            ChatEvent::Other { kind, .. } => kind,
        }
    }

    /// Returns true for events after which nothing else is dispatched.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Error { .. } | ChatEvent::Done { .. })
    }

    /// Returns the `text` field of a passthrough event, if it has one.
    pub fn text(&self) -> Option<&str> {
        match self {
            ChatEvent::Other { payload, .. } => payload.get("text").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Converts the event back into its wire JSON shape.
    pub fn to_value(&self) -> Value {
        match self {
            ChatEvent::Error { message } => serde_json::json!({
                "type": Self::ERROR,
                "error": message,
            }),
            ChatEvent::Done {
                session_id,
                token_estimate,
            } => {
                let mut map = Map::new();
                map.insert(KIND_FIELD.to_string(), Value::from(Self::DONE));
                if let Some(id) = session_id {
                    map.insert("sessionId".to_string(), Value::from(id.as_str()));
                }
                if let Some(estimate) = token_estimate {
                    map.insert("tokenEstimate".to_string(), Value::from(*estimate));
                }
                Value::Object(map)
            }
            ChatEvent::Other { payload, .. } => Value::Object(payload.clone()),
        }
    }
}

impl TryFrom<Value> for ChatEvent {
    type Error = EventParseError;

    fn try_from(value: Value) -> Result<Self, EventParseError> {
        ChatEvent::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_error_event_uses_error_field() {
        let event = ChatEvent::from_value(json!({"type": "error", "error": "rate limited"})).unwrap();
        assert_eq!(event, ChatEvent::error("rate limited"));
        assert!(event.is_terminal());
    }

    #[test]
    fn test_error_event_falls_back_to_message_then_default() {
        let event = ChatEvent::from_value(json!({"type": "error", "message": "boom"})).unwrap();
        assert_eq!(event, ChatEvent::error("boom"));

        let event = ChatEvent::from_value(json!({"type": "error"})).unwrap();
        assert_eq!(event, ChatEvent::error("Unknown error"));
    }

    #[test]
    fn test_done_event_reads_session_fields() {
        let event = ChatEvent::from_value(json!({
            "type": "done",
            "sessionId": "ses_1",
            "tokenEstimate": 420
        }))
        .unwrap();
        assert_eq!(
            event,
            ChatEvent::Done {
                session_id: Some("ses_1".to_string()),
                token_estimate: Some(420),
            }
        );
        assert_eq!(ChatEvent::from_value(json!({"type": "done"})).unwrap(), ChatEvent::done());
    }

    #[test]
    fn test_unknown_kind_passes_through_unmodified() {
        let raw = json!({"type": "tool_call", "tool_call": {"name": "bash", "input": {"cmd": "ls"}}});
        let event = ChatEvent::from_value(raw.clone()).unwrap();
        assert_eq!(event.kind(), "tool_call");
        assert!(!event.is_terminal());
        assert_eq!(event.to_value(), raw);
    }

    #[test]
    fn test_text_accessor() {
        let event = ChatEvent::from_value(json!({"type": "text_delta", "text": "hi"})).unwrap();
        assert_eq!(event.text(), Some("hi"));
        assert_eq!(ChatEvent::done().text(), None);
    }

    #[test]
    fn test_rejects_payload_without_discriminator() {
        assert_eq!(
            ChatEvent::from_value(json!({"text": "hi"})),
            Err(EventParseError::MissingKind)
        );
        assert_eq!(
            ChatEvent::from_value(json!({"type": 7})),
            Err(EventParseError::MissingKind)
        );
        assert_eq!(
            ChatEvent::from_value(json!([1, 2])),
            Err(EventParseError::NotAnObject)
        );
    }

    #[test]
    fn test_synthesized_done_serializes_without_fields() {
        assert_eq!(ChatEvent::done().to_value(), json!({"type": "done"}));
        assert_eq!(
            ChatEvent::error("nope").to_value(),
            json!({"type": "error", "error": "nope"})
        );
    }
}
