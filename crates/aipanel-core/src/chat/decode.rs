//! Incremental decoding of the chat response body into `data:` lines.
//!
//! Network reads split the body at arbitrary byte offsets, including in the
//! middle of a multi-byte character or a JSON line. `DecodeBuffer` carries
//! both kinds of partial input across reads.

use std::borrow::Cow;
use std::fmt;

use aipanel_types::{ChatEvent, EventParseError};

/// Prefix that marks an event line.
pub const EVENT_PREFIX: &str = "data: ";

/// Per-stream decoder state: undecoded trailing bytes plus the incomplete
/// last line.
#[derive(Debug, Default)]
pub struct DecodeBuffer {
    /// Start of a multi-byte sequence cut off by the chunk boundary (<= 3 bytes).
    partial: Vec<u8>,
    /// Decoded text after the last newline.
    pending: String,
}

impl DecodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the lines it completed, in order and
    /// without their `\n`. The trailing fragment stays buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // `pending` holds no `\n` between calls; only the new text can end a line.
        let start = self.pending.len();
        self.decode(chunk);

        let Some(last) = self.pending[start..].rfind('\n').map(|i| start + i) else {
            return Vec::new();
        };
        let rest = self.pending.split_off(last + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        complete[..last].split('\n').map(str::to_string).collect()
    }

    /// Text received after the last newline.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Appends `chunk` to `pending`. Invalid sequences become U+FFFD; an
    /// incomplete sequence at the end is held back for the next chunk.
    fn decode(&mut self, chunk: &[u8]) {
        let bytes: Cow<'_, [u8]> = if self.partial.is_empty() {
            Cow::Borrowed(chunk)
        } else {
            let mut joined = std::mem::take(&mut self.partial);
            joined.extend_from_slice(chunk);
            Cow::Owned(joined)
        };

        let mut input: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.pending.push_str(text);
                    return;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    self.pending
                        .push_str(&String::from_utf8_lossy(&input[..valid]));
                    match err.error_len() {
                        Some(len) => {
                            self.pending.push(char::REPLACEMENT_CHARACTER);
                            input = &input[valid + len..];
                        }
                        None => {
                            self.partial.extend_from_slice(&input[valid..]);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Why a `data:` line produced no event.
#[derive(Debug)]
pub enum LineError {
    Json(serde_json::Error),
    Event(EventParseError),
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineError::Json(err) => write!(f, "invalid JSON: {err}"),
            LineError::Event(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for LineError {}

/// Parses one framed line.
///
/// Returns `None` for lines that are not events (blank lines, comments,
/// other SSE fields), `Some(Err)` for a `data:` line that does not hold a
/// valid event object.
pub fn parse_line(line: &str) -> Option<Result<ChatEvent, LineError>> {
    let payload = line.trim().strip_prefix(EVENT_PREFIX)?;
    let parsed = serde_json::from_str(payload)
        .map_err(LineError::Json)
        .and_then(|value| ChatEvent::from_value(value).map_err(LineError::Event));
    Some(parsed)
}
