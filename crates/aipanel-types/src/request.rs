//! Chat request payloads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of an agent on the server. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentId(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidAgentId;

impl fmt::Display for InvalidAgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent id must not be empty")
    }
}

impl std::error::Error for InvalidAgentId {}

impl AgentId {
    /// Creates an agent id, trimming surrounding whitespace.
    ///
    /// # Errors
    /// Returns an error if the trimmed id is empty.
    pub fn new(id: impl AsRef<str>) -> Result<Self, InvalidAgentId> {
        let trimmed = id.as_ref().trim();
        if trimmed.is_empty() {
            return Err(InvalidAgentId);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AgentId {
    type Err = InvalidAgentId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A prior turn sent along for multi-turn context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

impl HistoryTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Optional parameters merged into the chat request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatParams {
    /// Resume an existing session; the server then loads history itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Extra system context (scenario background, page state).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Scenario label, e.g. "agent-creation" or "general".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
    /// Base64 `data:` URIs.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryTurn>,
    /// Free-form fields copied verbatim into the body.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Immutable input of one chat stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub agent_id: AgentId,
    pub message: String,
    pub params: ChatParams,
}

/// JSON body posted to the chat endpoint.
#[derive(Debug, Serialize)]
pub struct ChatBody<'a> {
    pub message: &'a str,
    #[serde(flatten)]
    pub params: &'a ChatParams,
}

impl ChatRequest {
    pub fn new(agent_id: AgentId, message: impl Into<String>) -> Self {
        Self {
            agent_id,
            message: message.into(),
            params: ChatParams::default(),
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: ChatParams) -> Self {
        self.params = params;
        self
    }

    pub fn body(&self) -> ChatBody<'_> {
        ChatBody {
            message: &self.message,
            params: &self.params,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_agent_id_rejects_blank() {
        assert_eq!(AgentId::new(""), Err(InvalidAgentId));
        assert_eq!(AgentId::new("   "), Err(InvalidAgentId));
        assert_eq!(AgentId::new(" main ").unwrap().as_str(), "main");
        assert!("ops-bot".parse::<AgentId>().is_ok());
    }

    #[test]
    fn test_body_with_only_message() {
        let request = ChatRequest::new(AgentId::new("main").unwrap(), "hello");
        let body = serde_json::to_value(request.body()).unwrap();
        assert_eq!(body, json!({"message": "hello"}));
    }

    #[test]
    fn test_body_merges_params_in_camel_case() {
        let mut extra = Map::new();
        extra.insert("locale".to_string(), json!("pt-BR"));
        let params = ChatParams {
            session_id: Some("ses_9".to_string()),
            context: Some("creating an agent".to_string()),
            scenario: Some("agent-creation".to_string()),
            skill_id: None,
            images: vec!["data:image/png;base64,AAAA".to_string()],
            history: vec![HistoryTurn::user("hi"), HistoryTurn::assistant("hello!")],
            extra,
        };
        let request = ChatRequest::new(AgentId::new("main").unwrap(), "next").with_params(params);

        let body = serde_json::to_value(request.body()).unwrap();
        assert_eq!(
            body,
            json!({
                "message": "next",
                "sessionId": "ses_9",
                "context": "creating an agent",
                "scenario": "agent-creation",
                "images": ["data:image/png;base64,AAAA"],
                "history": [
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello!"}
                ],
                "locale": "pt-BR"
            })
        );
    }
}
