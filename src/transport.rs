use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header;

use crate::{options::DEFAULT_POST_CONTENT_TYPE, Response, TransportError};

/// Sends single HTTP requests on behalf of the agent.
///
/// The timeout is passed with every call so that concurrent dispatches never
/// share mutable client configuration. `None` means no per-request timeout.
/// Implementations are swapped in through
/// [`HttpAgent::with_transport`](crate::HttpAgent::with_transport), which is
/// how tests replace the network with a stub.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_get(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<Response, TransportError>;

    async fn send_post(
        &self,
        url: &str,
        body: Bytes,
        content_type: &str,
        timeout: Option<Duration>,
    ) -> Result<Response, TransportError>;

    async fn send_head(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<Response, TransportError>;
}

/// Production transport backed by `reqwest`.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

fn with_timeout(
    request: reqwest::RequestBuilder,
    timeout: Option<Duration>,
) -> reqwest::RequestBuilder {
    match timeout {
        Some(timeout) => request.timeout(timeout),
        None => request,
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send_get(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<Response, TransportError> {
        let response = with_timeout(self.http.get(url), timeout).send().await?;
        Ok(Response::from_reqwest(response))
    }

    async fn send_post(
        &self,
        url: &str,
        body: Bytes,
        content_type: &str,
        timeout: Option<Duration>,
    ) -> Result<Response, TransportError> {
        let content_type = if content_type.is_empty() {
            DEFAULT_POST_CONTENT_TYPE
        } else {
            content_type
        };
        let request = self
            .http
            .post(url)
            .header(header::CONTENT_TYPE, content_type)
            .body(body);
        let response = with_timeout(request, timeout).send().await?;
        Ok(Response::from_reqwest(response))
    }

    async fn send_head(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<Response, TransportError> {
        let response = with_timeout(self.http.head(url), timeout).send().await?;
        Ok(Response::from_reqwest(response))
    }
}

/// HTTP method supported by the agent.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Method {
    Get,
    Post,
    Head,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Head => "HEAD",
        })
    }
}

/// One request to dispatch. Never mutated once handed to the agent.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub body: Option<Bytes>,
    pub content_type: String,
}

impl RequestSpec {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            content_type: String::new(),
        }
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self {
            method: Method::Head,
            ..Self::get(url)
        }
    }

    pub fn post(
        url: impl Into<String>,
        body: impl Into<Bytes>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body.into()),
            content_type: content_type.into(),
        }
    }
}

/// Issues exactly one attempt of `spec` through `transport`.
pub(crate) async fn send_once(
    transport: &dyn Transport,
    spec: &RequestSpec,
    timeout: Option<Duration>,
) -> Result<Response, TransportError> {
    tracing::debug!("sending {} request to {}", spec.method, spec.url);
    match spec.method {
        Method::Get => transport.send_get(&spec.url, timeout).await,
        Method::Head => transport.send_head(&spec.url, timeout).await,
        Method::Post => {
            let body = spec.body.clone().unwrap_or_default();
            transport
                .send_post(&spec.url, body, &spec.content_type, timeout)
                .await
        }
    }
}
