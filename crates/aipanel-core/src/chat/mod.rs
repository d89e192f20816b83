//! Chat streaming: response decoding, the stream driver and session status.

pub mod decode;
pub mod status;
pub mod stream;

pub use decode::{DecodeBuffer, EVENT_PREFIX, LineError, parse_line};
pub use status::{SessionStatus, chat_status};
pub use stream::{CancellationHandle, ChatClient, ChatEventStream, StreamState};
