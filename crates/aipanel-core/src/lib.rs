//! Streaming chat client for the aipanel agent server.
//!
//! [`ChatClient`] posts a message to an agent and dispatches the streamed
//! reply as ordered [`ChatEvent`]s with exactly one terminal outcome.

pub mod auth;
pub mod chat;
pub mod config;
pub mod images;
pub mod interrupt;
pub mod logging;
pub mod transport;

pub use aipanel_types::{AgentId, ChatEvent, ChatParams, ChatRequest, HistoryTurn, Role};
pub use auth::{NoToken, SessionInvalidation, SessionStore, StaticToken, TokenProvider};
pub use chat::{
    CancellationHandle, ChatClient, ChatEventStream, SessionStatus, StreamState, chat_status,
};
pub use config::Config;
pub use transport::{Transport, TransportError, TransportErrorKind};
