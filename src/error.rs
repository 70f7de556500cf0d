use std::fmt;

use reqwest::StatusCode;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Network or request execution error from the transport.
    #[error("sending request to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },
    /// Non-success HTTP status while `fail_on_http_error` is set.
    #[error("HTTP error {status} for {url}")]
    Http { status: StatusCode, url: String },
    /// Copying the response body into the buffer or writer failed.
    #[error("reading response from {url}: {source}")]
    Read {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// URL and POST payload lists of a group differ in length.
    #[error(
        "unable to perform requests, same number of URLs and POST payloads required \
         (got {urls} URLs and {payloads} payloads)"
    )]
    MismatchedPayloads { urls: usize, payloads: usize },
    /// Multi-writer group routing has no writer for this response.
    #[error("request {index} has no writer defined")]
    NoWriter { index: usize },
    /// Failure while materializing one member of a group.
    #[error("group response #{index}: {source}")]
    Member {
        index: usize,
        #[source]
        source: Box<AgentError>,
    },
    /// A dispatch task ended without producing an outcome.
    #[error("request task {index} failed: {message}")]
    TaskFailed { index: usize, message: String },
    /// Every failing slot of a group, folded into one error.
    #[error("{} of the group requests failed: {}", .0.len(), GroupSummary(.0))]
    Group(Vec<(usize, AgentError)>),
    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Invalid agent configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AgentError {
    /// Returns the HTTP status for [`AgentError::Http`], looking through
    /// group member wrapping.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Member { source, .. } => source.status(),
            _ => None,
        }
    }
}

struct GroupSummary<'a>(&'a Vec<(usize, AgentError)>);

impl fmt::Display for GroupSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, (index, error)) in self.0.iter().enumerate() {
            if position > 0 {
                f.write_str("; ")?;
            }
            write!(f, "#{index}: {error}")?;
        }
        Ok(())
    }
}

/// Broad classes of transport failure, used to decide retryability.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TransportErrorKind {
    /// The request or a read timed out.
    Timeout,
    /// The connection could not be established.
    Connect,
    /// The request failed while being sent.
    Request,
    /// The response body failed mid-stream.
    Body,
    /// The URL could not be parsed or the request could not be built.
    InvalidUrl,
    /// Redirect policy was violated.
    Redirect,
    /// Anything the transport could not classify.
    Other,
}

impl TransportErrorKind {
    /// Whether a later attempt may plausibly succeed.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connect | Self::Request | Self::Body
        )
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::InvalidUrl => "invalid url",
            Self::Redirect => "redirect",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Error reported by a [`Transport`](crate::Transport).
#[derive(Debug, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::Timeout
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_builder() {
            TransportErrorKind::InvalidUrl
        } else if err.is_redirect() {
            TransportErrorKind::Redirect
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else if err.is_request() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, err.to_string()).with_source(err)
    }
}
