//! Streaming chat client.
//!
//! `ChatClient::initiate` posts one message to an agent and feeds every event
//! of the streamed reply to a callback, in order, until exactly one terminal
//! outcome: a `done` event, an `error` event, or silent cancellation.

use std::error::Error as StdError;
use std::pin::Pin;
use std::task::{Context, Poll};

use aipanel_types::{ChatEvent, ChatRequest};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, USER_AGENT as USER_AGENT_HEADER};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, warn};
use url::Url;
use uuid::Uuid;

use super::decode::{DecodeBuffer, parse_line};
use crate::transport::{Transport, TransportError, USER_AGENT, authorize, status_error_message};

/// Lifecycle of one stream.
///
/// `Requesting` is entered on `initiate`, `Streaming` once a success status
/// is seen. The last four states are terminal and mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Requesting,
    Streaming,
    Done,
    NonStreamingError,
    StreamError,
    Cancelled,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamState::Done
                | StreamState::NonStreamingError
                | StreamState::StreamError
                | StreamState::Cancelled
        )
    }
}

/// Caller-side capability for one stream.
///
/// `cancel()` is cooperative: the stream notices it at its next await point
/// and stops without dispatching anything else. Cancelling twice, or after
/// the stream finished, does nothing.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    token: CancellationToken,
    state: watch::Receiver<StreamState>,
}

impl CancellationHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Waits until the stream reaches a terminal state and returns it.
    ///
    /// A stream whose task died before reaching one (a panicking
    /// `on_event`) reports `StreamError`.
    pub async fn finished(&self) -> StreamState {
        let mut state = self.state.clone();
        match state.wait_for(|s| s.is_terminal()).await {
            Ok(terminal) => *terminal,
            Err(_) => StreamState::StreamError,
        }
    }
}

/// Writer side of the lifecycle state. Once terminal, it never changes.
struct StateCell(watch::Sender<StreamState>);

impl StateCell {
    fn transition(&self, next: StreamState) {
        self.0.send_if_modified(|current| {
            if current.is_terminal() {
                return false;
            }
            *current = next;
            true
        });
    }
}

/// Client for the per-agent chat endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    transport: Transport,
}

impl ChatClient {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Starts streaming `request` and returns immediately.
    ///
    /// The session token is read once, now; later changes to the token
    /// store do not affect this stream. The read is synchronous: for a
    /// `SessionStore` it is one small file read on the calling thread.
    /// `on_event` runs on the stream's own task and is never called
    /// concurrently with itself.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn initiate<F>(&self, request: ChatRequest, on_event: F) -> CancellationHandle
    where
        F: FnMut(ChatEvent) + Send + 'static,
    {
        let token = self.transport.token();
        let url = self
            .transport
            .endpoint(&["agents", request.agent_id.as_str(), "chat"]);

        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(StreamState::Requesting);
        let handle = CancellationHandle {
            token: cancel.clone(),
            state: state_rx,
        };

        let span = debug_span!(
            "chat_stream",
            stream_id = %Uuid::new_v4(),
            agent = %request.agent_id,
        );
        let run = StreamRun {
            http: self.transport.http().clone(),
            url,
            token,
            request,
            cancel,
            state: StateCell(state_tx),
        };
        tokio::spawn(run.execute(on_event).instrument(span));

        handle
    }

    /// Pull-based variant of [`ChatClient::initiate`].
    ///
    /// The returned stream yields the same events and ends after the
    /// terminal one. Once cancelled, through its handle or by dropping it,
    /// it ends immediately, discarding events still queued.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn stream(&self, request: ChatRequest) -> ChatEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.initiate(request, move |event| {
            // Receiver gone means the consumer dropped the stream, which
            // also cancelled it.
            let _ = tx.send(event);
        });
        ChatEventStream { rx, handle }
    }
}

/// Events of one chat stream, in order.
#[derive(Debug)]
pub struct ChatEventStream {
    rx: mpsc::UnboundedReceiver<ChatEvent>,
    handle: CancellationHandle,
}

impl ChatEventStream {
    pub fn handle(&self) -> &CancellationHandle {
        &self.handle
    }
}

impl Stream for ChatEventStream {
    type Item = ChatEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.handle.is_cancelled() {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

impl Drop for ChatEventStream {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

struct StreamRun {
    http: reqwest::Client,
    url: anyhow::Result<Url>,
    token: Option<String>,
    request: ChatRequest,
    cancel: CancellationToken,
    state: StateCell,
}

impl StreamRun {
    async fn execute<F>(self, mut on_event: F)
    where
        F: FnMut(ChatEvent),
    {
        let outcome = self.run(&mut on_event).await;
        debug!(?outcome, "chat stream finished");
        self.state.transition(outcome);
    }

    async fn run<F>(&self, on_event: &mut F) -> StreamState
    where
        F: FnMut(ChatEvent),
    {
        let url = match &self.url {
            Ok(url) => url.clone(),
            Err(err) => {
                return self.fail(on_event, format!("{err:#}"), StreamState::NonStreamingError);
            }
        };

        let builder = self
            .http
            .post(url)
            .header(USER_AGENT_HEADER, USER_AGENT)
            .header(ACCEPT, "text/event-stream")
            .json(&self.request.body());
        let builder = authorize(builder, self.token.as_deref());

        debug!("issuing chat request");
        let sent = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return StreamState::Cancelled,
            sent = builder.send() => sent,
        };
        let response = match sent {
            Ok(response) => response,
            Err(err) => {
                let error = TransportError::from_reqwest(&err);
                warn!(kind = %error.kind, "chat request failed");
                return self.fail(on_event, error.message, StreamState::NonStreamingError);
            }
        };

        let status = response.status();
        debug!(status = status.as_u16(), "chat response received");
        if !status.is_success() {
            let body = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return StreamState::Cancelled,
                body = response.text() => body.unwrap_or_default(),
            };
            let message = status_error_message(status, &body);
            return self.fail(on_event, message, StreamState::NonStreamingError);
        }

        self.state.transition(StreamState::Streaming);
        pump(response.bytes_stream(), &self.cancel, on_event).await
    }

    fn fail<F>(&self, on_event: &mut F, message: String, state: StreamState) -> StreamState
    where
        F: FnMut(ChatEvent),
    {
        if self.cancel.is_cancelled() {
            return StreamState::Cancelled;
        }
        on_event(ChatEvent::error(message));
        state
    }
}

/// Reads `body` to its terminal outcome, dispatching events as lines
/// complete.
///
/// The chunk read is the only await point. End of body without a `done`
/// event synthesizes one; a `done` or `error` event ends the loop without
/// reading further; a read failure becomes one `error` event. After
/// cancellation nothing more is dispatched.
pub(crate) async fn pump<S, E, F>(body: S, cancel: &CancellationToken, on_event: &mut F) -> StreamState
where
    S: Stream<Item = Result<Bytes, E>>,
    E: StdError + Send + Sync + 'static,
    F: FnMut(ChatEvent),
{
    let mut body = std::pin::pin!(body);
    let mut buffer = DecodeBuffer::new();

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return StreamState::Cancelled,
            next = body.next() => next,
        };

        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => {
                if cancel.is_cancelled() {
                    return StreamState::Cancelled;
                }
                let message = read_error_message(&err);
                warn!(error = %message, "chat stream read failed");
                on_event(ChatEvent::error(message));
                return StreamState::StreamError;
            }
            None => {
                if cancel.is_cancelled() {
                    return StreamState::Cancelled;
                }
                debug!("stream closed without done event");
                on_event(ChatEvent::done());
                return StreamState::Done;
            }
        };

        for line in buffer.push(&chunk) {
            let event = match parse_line(&line) {
                None => continue,
                Some(Ok(event)) => event,
                Some(Err(err)) => {
                    warn!(error = %err, len = line.len(), "discarding malformed event line");
                    continue;
                }
            };

            if cancel.is_cancelled() {
                return StreamState::Cancelled;
            }
            let terminal = match &event {
                ChatEvent::Done { .. } => Some(StreamState::Done),
                ChatEvent::Error { .. } => Some(StreamState::StreamError),
                ChatEvent::Other { .. } => None,
            };
            on_event(event);
            if let Some(state) = terminal {
                return state;
            }
        }
    }
}

fn read_error_message<E>(err: &E) -> String
where
    E: StdError + 'static,
{
    let err: &(dyn StdError + 'static) = err;
    match err.downcast_ref::<reqwest::Error>() {
        Some(reqwest_err) => TransportError::from_reqwest(reqwest_err).message,
        None => format!("Network error: {err}"),
    }
}
