//! Wire types shared by the aipanel chat client and its front-ends.

pub mod event;
pub mod request;

pub use event::{ChatEvent, EventParseError, KIND_FIELD};
pub use request::{AgentId, ChatBody, ChatParams, ChatRequest, HistoryTurn, InvalidAgentId, Role};
