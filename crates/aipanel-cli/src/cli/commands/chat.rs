//! Chat command handler: streams one turn to the terminal.

use std::io::{Write, stderr, stdout};

use aipanel_core::images::{load_image_data_uri, normalize_input_path};
use aipanel_core::interrupt::{self, InterruptedError};
use aipanel_core::{AgentId, ChatClient, ChatEvent, ChatParams, ChatRequest, Transport};
use anyhow::{Context, Result};
use futures_util::StreamExt;
use serde_json::Value;

const RESULT_PREVIEW_CHARS: usize = 80;

#[derive(clap::Args, Debug)]
pub struct ChatArgs {
    /// Agent to talk to
    #[arg(value_name = "AGENT_ID")]
    pub agent: AgentId,

    /// Message to send
    #[arg(value_name = "MESSAGE")]
    pub message: String,

    /// Continue an existing session
    #[arg(long, value_name = "ID")]
    pub session: Option<String>,

    /// Extra context passed to the agent
    #[arg(long, value_name = "TEXT")]
    pub context: Option<String>,

    /// Scenario label (e.g. agent-creation)
    #[arg(long, value_name = "LABEL")]
    pub scenario: Option<String>,

    /// Skill to apply
    #[arg(long = "skill", value_name = "ID")]
    pub skill_id: Option<String>,

    /// Attach an image (repeatable)
    #[arg(long = "image", value_name = "PATH")]
    pub images: Vec<String>,

    /// Print every event as one JSON line
    #[arg(long)]
    pub json: bool,
}

impl ChatArgs {
    fn into_request(self) -> Result<ChatRequest> {
        let images = self
            .images
            .iter()
            .map(|raw| {
                let path = normalize_input_path(raw);
                load_image_data_uri(&path).with_context(|| format!("attach image {raw}"))
            })
            .collect::<Result<Vec<_>>>()?;

        let params = ChatParams {
            session_id: self.session,
            context: self.context,
            scenario: self.scenario,
            skill_id: self.skill_id,
            images,
            ..ChatParams::default()
        };
        Ok(ChatRequest::new(self.agent, self.message).with_params(params))
    }
}

pub async fn run(args: ChatArgs, transport: Transport) -> Result<()> {
    let json = args.json;
    let request = args.into_request()?;
    let mut renderer = ChatRenderer::new(stdout(), stderr(), json);

    let client = ChatClient::new(transport);
    let mut events = client.stream(request);

    loop {
        let next = tokio::select! {
            () = interrupt::wait_for_interrupt() => {
                events.handle().cancel();
                renderer.interrupted();
                return Err(InterruptedError.into());
            }
            next = events.next() => next,
        };
        let Some(event) = next else {
            break;
        };

        renderer.handle_event(&event);
        if let ChatEvent::Error { message } = event {
            renderer.finish();
            anyhow::bail!("{message}");
        }
    }

    renderer.finish();
    Ok(())
}

/// Writes chat events to stdout/stderr.
///
/// # Output contract
/// - `text_delta` → stdout
/// - thinking, tool markers and the session id → stderr (dim)
/// - `--json`: every event as one NDJSON line on stdout
pub struct ChatRenderer<O: Write, E: Write> {
    out: O,
    err: E,
    json: bool,
    /// Whether stdout has text not yet terminated by a newline.
    needs_final_newline: bool,
    /// Whether stderr is mid-way through a thinking block.
    in_thinking: bool,
}

impl<O: Write, E: Write> ChatRenderer<O, E> {
    pub fn new(out: O, err: E, json: bool) -> Self {
        Self {
            out,
            err,
            json,
            needs_final_newline: false,
            in_thinking: false,
        }
    }

    pub fn handle_event(&mut self, event: &ChatEvent) {
        if self.json {
            let _ = writeln!(self.out, "{}", event.to_value());
            let _ = self.out.flush();
            return;
        }

        match event {
            ChatEvent::Other { kind, payload } => match kind.as_str() {
                "text_delta" => {
                    self.end_thinking();
                    if let Some(text) = event.text().filter(|t| !t.is_empty()) {
                        let _ = write!(self.out, "{text}");
                        let _ = self.out.flush();
                        self.needs_final_newline = true;
                    }
                }
                "thinking_delta" => {
                    if let Some(text) = event.text().filter(|t| !t.is_empty()) {
                        let _ = write!(self.err, "\x1b[2m{text}\x1b[0m");
                        let _ = self.err.flush();
                        self.in_thinking = true;
                    }
                }
                "tool_call" => {
                    self.finish();
                    let name = payload
                        .get("tool_call")
                        .and_then(|call| call.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or("tool");
                    let _ = writeln!(self.err, "\x1b[2m⚙ {name}\x1b[0m");
                }
                "tool_result" => {
                    self.finish();
                    let preview = preview(event.text().unwrap_or_default());
                    let _ = writeln!(self.err, "\x1b[2m↳ {preview}\x1b[0m");
                }
                _ => {}
            },
            ChatEvent::Done { session_id, .. } => {
                self.finish();
                if let Some(id) = session_id {
                    let _ = writeln!(self.err, "\x1b[2msession: {id}\x1b[0m");
                }
            }
            // Reported by the caller through the returned error.
            ChatEvent::Error { .. } => {}
        }
    }

    pub fn interrupted(&mut self) {
        self.finish();
        let _ = writeln!(self.err, "^C Interrupted.");
    }

    /// Terminates any open output line.
    pub fn finish(&mut self) {
        self.end_thinking();
        if self.needs_final_newline {
            let _ = writeln!(self.out);
            let _ = self.out.flush();
            self.needs_final_newline = false;
        }
    }

    fn end_thinking(&mut self) {
        if self.in_thinking {
            let _ = writeln!(self.err);
            self.in_thinking = false;
        }
    }
}

/// First line of a tool result, shortened for display.
fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    if line.chars().count() > RESULT_PREVIEW_CHARS {
        let head: String = line.chars().take(RESULT_PREVIEW_CHARS).collect();
        format!("{head}…")
    } else {
        line.to_string()
    }
}
