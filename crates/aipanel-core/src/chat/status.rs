//! Session status probe for a running chat.

use aipanel_types::AgentId;
use serde::Deserialize;

use crate::transport::{Transport, TransportError};

/// Server-side view of one chat session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// `idle` or `generating`; other values are passed through untouched.
    pub status: String,
    #[serde(default)]
    pub has_worker: bool,
    #[serde(default)]
    pub buffered_events: Option<u64>,
}

impl SessionStatus {
    pub fn is_generating(&self) -> bool {
        self.status == "generating"
    }
}

/// `GET /api/agents/<id>/chat/status?sessionId=<session>`.
///
/// # Errors
/// Returns a `TransportError` on network failure, non-2xx status (401
/// invalidates the stored session) or an unexpected body.
pub async fn chat_status(
    transport: &Transport,
    agent: &AgentId,
    session_id: &str,
) -> Result<SessionStatus, TransportError> {
    transport
        .get_json(
            &["agents", agent.as_str(), "chat", "status"],
            &[("sessionId", session_id)],
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_deserializes_camel_case() {
        let status: SessionStatus = serde_json::from_str(
            r#"{"status":"generating","hasWorker":true,"bufferedEvents":3}"#,
        )
        .unwrap();
        assert!(status.is_generating());
        assert!(status.has_worker);
        assert_eq!(status.buffered_events, Some(3));
    }

    #[test]
    fn test_status_optional_fields() {
        let status: SessionStatus = serde_json::from_str(r#"{"status":"idle"}"#).unwrap();
        assert!(!status.is_generating());
        assert!(!status.has_worker);
        assert_eq!(status.buffered_events, None);
    }
}
