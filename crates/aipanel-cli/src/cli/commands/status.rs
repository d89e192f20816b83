//! Session status handler.

use aipanel_core::{AgentId, Transport, chat_status};
use anyhow::{Context, Result};

pub async fn run(transport: &Transport, agent: &str, session: &str) -> Result<()> {
    let agent = AgentId::new(agent)?;
    let status = chat_status(transport, &agent, session)
        .await
        .with_context(|| format!("fetch status of session {session}"))?;

    println!("status: {}", status.status);
    println!("worker: {}", if status.has_worker { "yes" } else { "no" });
    if let Some(buffered) = status.buffered_events {
        println!("buffered events: {buffered}");
    }
    Ok(())
}
