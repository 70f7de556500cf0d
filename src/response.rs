use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::{header::HeaderMap, StatusCode};

use crate::TransportError;

/// A boxed stream of body chunks.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Response body, either fully buffered or streamed from the transport.
///
/// Dropping the body releases the underlying connection.
pub struct Body {
    inner: BodyInner,
}

enum BodyInner {
    Full(Option<Bytes>),
    Streaming(BoxStream<'static, std::result::Result<Bytes, TransportError>>),
}

impl Body {
    pub fn empty() -> Self {
        Self {
            inner: BodyInner::Full(None),
        }
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, TransportError>> + Send + 'static,
    {
        Self {
            inner: BodyInner::Streaming(Box::pin(stream)),
        }
    }

    /// Returns the next chunk, or `None` once the body is exhausted.
    pub async fn chunk(&mut self) -> Option<std::result::Result<Bytes, TransportError>> {
        match &mut self.inner {
            BodyInner::Full(bytes) => bytes.take().filter(|b| !b.is_empty()).map(Ok),
            BodyInner::Streaming(stream) => stream.next().await,
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self {
            inner: BodyInner::Full(Some(bytes)),
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            BodyInner::Full(bytes) => f
                .debug_struct("Body")
                .field("len", &bytes.as_ref().map_or(0, Bytes::len))
                .finish(),
            BodyInner::Streaming(_) => f.debug_struct("Body").field("streaming", &true).finish(),
        }
    }
}

/// An HTTP response as returned by a [`Transport`](crate::Transport).
///
/// The body is owned by whoever holds the response; dropping it closes the body.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    url: String,
    headers: HeaderMap,
    body: Body,
}

impl Response {
    pub fn new(status: StatusCode, url: impl Into<String>) -> Self {
        Self {
            status,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Canonical reason phrase for the status, if one is defined.
    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// URL the response was served for (after redirects).
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    /// Reads the whole body, ignoring the status.
    pub async fn bytes(self) -> std::result::Result<Bytes, TransportError> {
        let mut body = self.body;
        let mut buffer = Vec::new();
        while let Some(chunk) = body.chunk().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buffer))
    }

    pub(crate) fn from_reqwest(response: reqwest::Response) -> Self {
        let status = response.status();
        let url = response.url().to_string();
        let headers = response.headers().clone();
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from));
        Self {
            status,
            url,
            headers,
            body: Body::from_stream(stream),
        }
    }
}
