use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWrite;

use crate::{
    group::{dispatch_group, mismatched_payloads, read_group, route_to_writers},
    reader::{read_response, read_response_to_bytes},
    retry::RetryingRequest,
    transport::{ReqwestTransport, RequestSpec, Transport},
    AgentError, AgentOptions, Response, Result,
};

#[derive(Clone)]
/// HTTP agent performing GET, POST and HEAD requests with retries, alone or
/// in bounded parallel groups.
///
/// Operation names follow `METHOD[_request|_to_writer][_group]`:
/// the plain form returns the body bytes, `_request` returns the raw
/// [`Response`] and `_to_writer` streams the body into an `AsyncWrite`.
/// Group variants take slices and return one result per input, in order.
pub struct HttpAgent {
    transport: Arc<dyn Transport>,
    options: AgentOptions,
}

impl fmt::Debug for HttpAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpAgent")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for HttpAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpAgent {
    /// Creates an agent with default options and a `reqwest` transport.
    pub fn new() -> Self {
        Self {
            transport: Arc::new(ReqwestTransport::default()),
            options: AgentOptions::default(),
        }
    }

    /// Creates an agent configured from `HTTP_AGENT_*` environment variables.
    ///
    /// See [`AgentOptions::from_env`] for the variables read.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new().with_options(AgentOptions::from_env()?))
    }

    /// Replaces all options at once.
    pub fn with_options(mut self, opts: AgentOptions) -> Self {
        self.options = opts;
        self
    }

    /// Sets the per-request timeout. [`Duration::ZERO`] disables it; any other
    /// value is rounded to whole milliseconds, never below one.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout_ms = if timeout.is_zero() {
            0
        } else {
            duration_ms(timeout).max(1)
        };
        self
    }

    /// Sets how many times a request is attempted. `0` and `1` both mean a
    /// single attempt without retries.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.options.max_retries = retries;
        self
    }

    /// Sets the initial backoff between attempts.
    pub fn with_wait_time(mut self, wait: Duration) -> Self {
        self.options.retry_backoff_ms = duration_ms(wait);
        self
    }

    /// Sets the upper bound for a single backoff delay. [`Duration::ZERO`]
    /// leaves the delay uncapped.
    pub fn with_max_wait_time(mut self, wait: Duration) -> Self {
        self.options.max_backoff_ms = duration_ms(wait);
        self
    }

    /// Whether statuses outside `200..300` are errors when reading responses.
    pub fn with_fail_on_http_error(mut self, flag: bool) -> Self {
        self.options.fail_on_http_error = flag;
        self
    }

    /// Caps the number of concurrent requests of group operations (minimum 1).
    pub fn with_max_parallel(mut self, workers: usize) -> Self {
        self.options.max_parallel = workers.max(1);
        self
    }

    pub fn with_post_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.options.post_content_type = content_type.into();
        self
    }

    /// Uses a preconfigured `reqwest` client for the default transport.
    pub fn with_client(self, client: reqwest::Client) -> Self {
        self.with_transport(ReqwestTransport::new(client))
    }

    /// Replaces the transport, e.g. with a test double.
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Like [`HttpAgent::with_transport`] for an already shared transport.
    pub fn with_shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// Returns the body of a GET request.
    pub async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get_request(url).await?;
        read_response_to_bytes(response, self.options.fail_on_http_error).await
    }

    /// Returns the body of a GET request as text, optionally trimmed.
    pub async fn get_text(&self, url: &str, trim: bool) -> Result<String> {
        let body = self.get(url).await?;
        let text = String::from_utf8(body)
            .map_err(|err| AgentError::Decode(format!("response from {url} is not UTF-8: {err}")))?;
        if trim {
            Ok(text.trim().to_owned())
        } else {
            Ok(text)
        }
    }

    /// Sends a GET request and returns the raw response.
    pub async fn get_request(&self, url: &str) -> Result<Response> {
        self.send(RequestSpec::get(url)).await
    }

    /// Streams the body of a GET request into `writer`.
    pub async fn get_to_writer<W>(&self, writer: &mut W, url: &str) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let response = self.get_request(url).await?;
        read_response(response, writer, self.options.fail_on_http_error).await
    }

    /// Returns the body of a POST request.
    pub async fn post(&self, url: &str, post_data: impl Into<Bytes>) -> Result<Vec<u8>> {
        let response = self.post_request(url, post_data).await?;
        read_response_to_bytes(response, self.options.fail_on_http_error).await
    }

    /// Sends `post_data` in a POST request and returns the raw response.
    pub async fn post_request(&self, url: &str, post_data: impl Into<Bytes>) -> Result<Response> {
        self.send(self.post_spec(url, post_data.into())).await
    }

    /// Streams the body of a POST request into `writer`.
    pub async fn post_to_writer<W>(
        &self,
        writer: &mut W,
        url: &str,
        post_data: impl Into<Bytes>,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let response = self.post_request(url, post_data).await?;
        read_response(response, writer, self.options.fail_on_http_error).await
    }

    /// Returns the body of a HEAD request (normally empty).
    pub async fn head(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.head_request(url).await?;
        read_response_to_bytes(response, self.options.fail_on_http_error).await
    }

    /// Sends a HEAD request and returns the raw response.
    pub async fn head_request(&self, url: &str) -> Result<Response> {
        self.send(RequestSpec::head(url)).await
    }

    pub async fn head_to_writer<W>(&self, writer: &mut W, url: &str) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let response = self.head_request(url).await?;
        read_response(response, writer, self.options.fail_on_http_error).await
    }

    /// GET every URL in parallel and return the bodies, index-aligned with `urls`.
    pub async fn get_group<S: AsRef<str>>(&self, urls: &[S]) -> Vec<Result<Vec<u8>>> {
        let responses = self.get_request_group(urls).await;
        read_group(responses, self.options.fail_on_http_error).await
    }

    /// GET every URL in parallel and return the raw responses.
    pub async fn get_request_group<S: AsRef<str>>(&self, urls: &[S]) -> Vec<Result<Response>> {
        let specs = urls.iter().map(|url| RequestSpec::get(url.as_ref())).collect();
        self.dispatch(specs).await
    }

    /// GET every URL in parallel and write the bodies out.
    ///
    /// A single writer receives every body, in input order. Otherwise body `i`
    /// goes to `writers[i]` and responses without a writer fail with
    /// [`AgentError::NoWriter`].
    pub async fn get_to_writer_group<W, S>(&self, writers: &mut [W], urls: &[S]) -> Vec<Result<()>>
    where
        W: AsyncWrite + Unpin,
        S: AsRef<str>,
    {
        let responses = self.get_request_group(urls).await;
        route_to_writers(writers, responses, self.options.fail_on_http_error).await
    }

    /// POST `post_data[i]` to `urls[i]` in parallel and return the bodies.
    ///
    /// `urls` and `post_data` must have the same length; otherwise nothing is
    /// sent and every slot holds [`AgentError::MismatchedPayloads`].
    pub async fn post_group<S, B>(&self, urls: &[S], post_data: &[B]) -> Vec<Result<Vec<u8>>>
    where
        S: AsRef<str>,
        B: AsRef<[u8]>,
    {
        let responses = self.post_request_group(urls, post_data).await;
        read_group(responses, self.options.fail_on_http_error).await
    }

    /// POST `post_data[i]` to `urls[i]` in parallel and return the raw responses.
    pub async fn post_request_group<S, B>(
        &self,
        urls: &[S],
        post_data: &[B],
    ) -> Vec<Result<Response>>
    where
        S: AsRef<str>,
        B: AsRef<[u8]>,
    {
        if urls.len() != post_data.len() {
            return mismatched_payloads(urls.len(), post_data.len());
        }
        let specs = urls
            .iter()
            .zip(post_data)
            .map(|(url, data)| {
                self.post_spec(url.as_ref(), Bytes::copy_from_slice(data.as_ref()))
            })
            .collect();
        self.dispatch(specs).await
    }

    /// POST in parallel and write the bodies out; see
    /// [`HttpAgent::get_to_writer_group`] for the writer rules.
    pub async fn post_to_writer_group<W, S, B>(
        &self,
        writers: &mut [W],
        urls: &[S],
        post_data: &[B],
    ) -> Vec<Result<()>>
    where
        W: AsyncWrite + Unpin,
        S: AsRef<str>,
        B: AsRef<[u8]>,
    {
        let responses = self.post_request_group(urls, post_data).await;
        route_to_writers(writers, responses, self.options.fail_on_http_error).await
    }

    pub async fn head_group<S: AsRef<str>>(&self, urls: &[S]) -> Vec<Result<Vec<u8>>> {
        let responses = self.head_request_group(urls).await;
        read_group(responses, self.options.fail_on_http_error).await
    }

    pub async fn head_request_group<S: AsRef<str>>(&self, urls: &[S]) -> Vec<Result<Response>> {
        let specs = urls.iter().map(|url| RequestSpec::head(url.as_ref())).collect();
        self.dispatch(specs).await
    }

    pub async fn head_to_writer_group<W, S>(
        &self,
        writers: &mut [W],
        urls: &[S],
    ) -> Vec<Result<()>>
    where
        W: AsyncWrite + Unpin,
        S: AsRef<str>,
    {
        let responses = self.head_request_group(urls).await;
        route_to_writers(writers, responses, self.options.fail_on_http_error).await
    }

    fn post_spec(&self, url: &str, body: Bytes) -> RequestSpec {
        RequestSpec::post(url, body, self.options.post_content_type.clone())
    }

    fn retrying(&self) -> RetryingRequest {
        RetryingRequest::new(Arc::clone(&self.transport), &self.options)
    }

    async fn send(&self, spec: RequestSpec) -> Result<Response> {
        self.retrying().execute(&spec).await
    }

    async fn dispatch(&self, specs: Vec<RequestSpec>) -> Vec<Result<Response>> {
        tracing::debug!(
            "dispatching {} requests, at most {} in parallel",
            specs.len(),
            self.options.parallelism()
        );
        dispatch_group(&self.retrying(), specs, self.options.parallelism()).await
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
