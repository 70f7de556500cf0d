use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AgentError, Result};

/// Content type sent with POST requests unless configured otherwise.
pub const DEFAULT_POST_CONTENT_TYPE: &str = "application/octet-stream";

/// Configures timeouts, retries, HTTP error policy and group parallelism.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentOptions {
    /// Fail on HTTP statuses outside `200..300` when reading responses.
    pub fail_on_http_error: bool,
    /// Maximum number of attempts per request. `0` and `1` both mean a single
    /// attempt without any retry loop.
    pub max_retries: u32,
    /// Per-request timeout in milliseconds. `0` disables the timeout.
    pub timeout_ms: u64,
    /// Initial retry backoff in milliseconds (exponential strategy).
    pub retry_backoff_ms: u64,
    /// Upper bound for a single backoff delay in milliseconds. `0` means
    /// uncapped.
    pub max_backoff_ms: u64,
    /// Content type sent with POST payloads.
    pub post_content_type: String,
    /// Maximum number of requests in flight during group operations.
    pub max_parallel: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            fail_on_http_error: true,
            max_retries: 3,
            timeout_ms: 3_000,
            retry_backoff_ms: 2_000,
            max_backoff_ms: 60_000,
            post_content_type: DEFAULT_POST_CONTENT_TYPE.to_owned(),
            max_parallel: 5,
        }
    }
}

impl fmt::Display for AgentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HTTP agent options: timeout {}ms, retries {}, fail on HTTP error {}",
            self.timeout_ms, self.max_retries, self.fail_on_http_error
        )
    }
}

impl AgentOptions {
    /// Per-request timeout, or `None` when `timeout_ms` is zero.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Parallelism with the `>= 1` invariant applied.
    pub fn parallelism(&self) -> usize {
        self.max_parallel.max(1)
    }

    /// Builds options from environment variables, starting from the defaults.
    ///
    /// Reads (all optional):
    /// - `HTTP_AGENT_TIMEOUT_MS`
    /// - `HTTP_AGENT_RETRIES`
    /// - `HTTP_AGENT_WAIT_MS`
    /// - `HTTP_AGENT_MAX_WAIT_MS`
    /// - `HTTP_AGENT_FAIL_ON_HTTP_ERROR`
    /// - `HTTP_AGENT_MAX_PARALLEL`
    /// - `HTTP_AGENT_POST_CONTENT_TYPE`
    ///
    /// Returns [`AgentError::Config`] if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(value) = read_var::<u64, _>(&lookup, "HTTP_AGENT_TIMEOUT_MS")? {
            options.timeout_ms = value;
        }
        if let Some(value) = read_var::<u32, _>(&lookup, "HTTP_AGENT_RETRIES")? {
            options.max_retries = value;
        }
        if let Some(value) = read_var::<u64, _>(&lookup, "HTTP_AGENT_WAIT_MS")? {
            options.retry_backoff_ms = value;
        }
        if let Some(value) = read_var::<u64, _>(&lookup, "HTTP_AGENT_MAX_WAIT_MS")? {
            options.max_backoff_ms = value;
        }
        if let Some(value) = read_var::<bool, _>(&lookup, "HTTP_AGENT_FAIL_ON_HTTP_ERROR")? {
            options.fail_on_http_error = value;
        }
        if let Some(value) = read_var::<usize, _>(&lookup, "HTTP_AGENT_MAX_PARALLEL")? {
            options.max_parallel = value.max(1);
        }
        if let Some(value) = lookup("HTTP_AGENT_POST_CONTENT_TYPE") {
            let value = value.trim();
            if !value.is_empty() {
                options.post_content_type = value.to_owned();
            }
        }

        Ok(options)
    }
}

fn read_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>()
        .map(Some)
        .map_err(|err| AgentError::Config(format!("{key}={raw:?} is invalid: {err}")))
}
