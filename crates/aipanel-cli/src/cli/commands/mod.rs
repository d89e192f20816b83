//! CLI command handlers.

pub mod auth;
pub mod chat;
pub mod config;
pub mod status;
