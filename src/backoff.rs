use std::time::Duration;

use reqwest::StatusCode;

use crate::{AgentOptions, Response, TransportError};

/// How a single attempt ended, from the retry loop's point of view.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Classification {
    /// Status in `200..300`.
    Success,
    /// Worth another attempt if the budget allows.
    Retry,
    /// Stop now. A terminal response is still handed to the caller.
    Terminal,
}

/// Exponential backoff schedule and retryability rules.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BackoffPolicy {
    max_attempts: u32,
    initial: Duration,
    max: Duration,
}

impl BackoffPolicy {
    pub fn new(max_retries: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_attempts: max_retries.max(1),
            initial,
            max,
        }
    }

    pub fn from_options(options: &AgentOptions) -> Self {
        Self::new(
            options.max_retries,
            Duration::from_millis(options.retry_backoff_ms),
            Duration::from_millis(options.max_backoff_ms),
        )
    }

    /// Total attempts allowed, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the retry that follows attempt number `attempt` (0-based):
    /// `initial * 2^attempt`, capped at the configured maximum unless that
    /// maximum is zero.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let multiplier = 2_u32.saturating_pow(attempt.min(31));
        let delay = self.initial.saturating_mul(multiplier);
        if self.max.is_zero() {
            delay
        } else {
            delay.min(self.max)
        }
    }

    pub fn classify(
        &self,
        outcome: &std::result::Result<Response, TransportError>,
    ) -> Classification {
        match outcome {
            Ok(response) => classify_status(response.status()),
            Err(err) if err.kind().is_transient() => Classification::Retry,
            Err(_) => Classification::Terminal,
        }
    }
}

pub fn classify_status(status: StatusCode) -> Classification {
    if status.is_success() {
        Classification::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || (status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED)
    {
        Classification::Retry
    } else {
        Classification::Terminal
    }
}
