//! Authenticated HTTP transport to the aipanel server.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::header::{ACCEPT, USER_AGENT as USER_AGENT_HEADER};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::auth::{SessionInvalidation, TokenProvider};

/// Standard User-Agent header for aipanel API requests.
pub const USER_AGENT: &str = concat!("aipanel/", env!("CARGO_PKG_VERSION"));

/// Categories of transport errors for consistent error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The server rejected the session token (HTTP 401)
    Unauthorized,
    /// Any other non-success HTTP status
    HttpStatus,
    /// Request timed out
    Timeout,
    /// Connection could not be established
    Connect,
    /// Other network-level failure
    Network,
    /// Response body did not have the expected shape
    Parse,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Unauthorized => write!(f, "unauthorized"),
            TransportErrorKind::HttpStatus => write!(f, "http_status"),
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::Connect => write!(f, "connect"),
            TransportErrorKind::Network => write!(f, "network"),
            TransportErrorKind::Parse => write!(f, "parse"),
        }
    }
}

/// Structured transport error with kind and details.
#[derive(Debug, Clone)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(
            TransportErrorKind::Unauthorized,
            "Session expired or invalid; log in again",
        )
    }

    /// Creates an HTTP status error, preferring the server's `error` field.
    pub fn http_status(status: StatusCode, body: &str) -> Self {
        Self {
            kind: TransportErrorKind::HttpStatus,
            message: status_error_message(status, body),
            details: (!body.is_empty()).then(|| body.to_string()),
        }
    }

    /// Classifies a reqwest failure.
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::new(TransportErrorKind::Timeout, format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Self::new(TransportErrorKind::Connect, format!("Connection failed: {e}"))
        } else if e.is_decode() {
            Self::new(TransportErrorKind::Parse, format!("Invalid response: {e}"))
        } else {
            Self::new(TransportErrorKind::Network, format!("Network error: {e}"))
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TransportError {}

/// Derives the user-facing message for a non-success response.
///
/// A JSON body with a string `error` field yields that field; other JSON
/// yields `HTTP <status>`; a body that is not JSON is appended verbatim.
pub fn status_error_message(status: StatusCode, body: &str) -> String {
    let code = status.as_u16();
    if body.trim().is_empty() {
        return format!("HTTP {code}");
    }
    match serde_json::from_str::<Value>(body) {
        Ok(json) => json
            .get("error")
            .and_then(Value::as_str)
            .filter(|msg| !msg.is_empty())
            .map_or_else(|| format!("HTTP {code}"), str::to_string),
        Err(_) => format!("HTTP {code}: {body}"),
    }
}

/// Attaches `Authorization: Bearer <token>` when a token is present.
pub fn authorize(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token.map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}

/// Shared HTTP client bound to one server and one token source.
#[derive(Clone)]
pub struct Transport {
    http: reqwest::Client,
    base: Url,
    tokens: Arc<dyn TokenProvider>,
    invalidation: SessionInvalidation,
}

impl Transport {
    /// Creates a transport without a connect timeout.
    ///
    /// # Errors
    /// Returns an error if `base` cannot carry a path or the HTTP client
    /// fails to build.
    pub fn new(base: Url, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        Self::with_connect_timeout(base, tokens, None)
    }

    /// Creates a transport whose connection attempts give up after
    /// `connect_timeout`. Established streams are never timed out.
    ///
    /// # Errors
    /// Returns an error if `base` cannot carry a path or the HTTP client
    /// fails to build.
    pub fn with_connect_timeout(
        base: Url,
        tokens: Arc<dyn TokenProvider>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        if base.cannot_be_a_base() {
            anyhow::bail!("Server URL cannot be used as a base: {base}");
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build().context("build HTTP client")?;

        Ok(Self {
            http,
            base,
            tokens,
            invalidation: SessionInvalidation::default(),
        })
    }

    /// Sets the behaviour run when the server answers 401.
    #[must_use]
    pub fn on_unauthorized(mut self, invalidation: SessionInvalidation) -> Self {
        self.invalidation = invalidation;
        self
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Current session token, read from the provider at call time.
    pub fn token(&self) -> Option<String> {
        self.tokens.token()
    }

    /// Builds `<base>/api/<segments...>`, percent-encoding each segment.
    ///
    /// # Errors
    /// Returns an error if the base URL cannot carry a path.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("Server URL cannot be used as a base: {}", self.base))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    /// Starts a JSON API request carrying the current token.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header(USER_AGENT_HEADER, USER_AGENT)
            .header(ACCEPT, "application/json");
        authorize(builder, self.token().as_deref())
    }

    /// Sends a request, mapping non-success statuses to errors.
    ///
    /// A 401 invalidates the stored session before the error is returned.
    ///
    /// # Errors
    /// Returns a `TransportError` for network failures and non-2xx statuses.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, TransportError> {
        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!("server rejected session token");
            self.invalidation.invalidate();
            return Err(TransportError::unauthorized());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::http_status(status, &body));
        }
        Ok(response)
    }

    /// GETs `<base>/api/<segments...>?<query>` and decodes the JSON body.
    ///
    /// # Errors
    /// Returns a `TransportError` on network failure, non-2xx status, or a
    /// body that does not decode as `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, TransportError> {
        let url = self
            .endpoint(segments)
            .map_err(|e| TransportError::new(TransportErrorKind::Network, format!("{e:#}")))?;
        let response = self
            .send(self.request(Method::GET, url).query(query))
            .await?;
        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("base", &self.base.as_str())
            .field("invalidation", &self.invalidation)
            .finish_non_exhaustive()
    }
}
