use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::{
    backoff::{BackoffPolicy, Classification},
    transport::{send_once, RequestSpec, Transport},
    AgentError, AgentOptions, Response, Result,
};

/// A single request made resilient by [`BackoffPolicy`].
///
/// Holds its own snapshot of the transport handle and timing options, so it
/// can be moved into a spawned task.
#[derive(Clone)]
pub struct RetryingRequest {
    transport: Arc<dyn Transport>,
    policy: BackoffPolicy,
    timeout: Option<Duration>,
}

impl RetryingRequest {
    pub fn new(transport: Arc<dyn Transport>, options: &AgentOptions) -> Self {
        Self {
            transport,
            policy: BackoffPolicy::from_options(options),
            timeout: options.timeout(),
        }
    }

    /// Sends `spec`, retrying transient failures.
    ///
    /// Success and terminal outcomes return immediately. Once the attempt
    /// budget is spent the last outcome is returned as-is: a response with a
    /// retryable status is still `Ok`, leaving the status policy to the reader.
    pub async fn execute(&self, spec: &RequestSpec) -> Result<Response> {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0u32;
        loop {
            let outcome = send_once(self.transport.as_ref(), spec, self.timeout).await;
            attempt += 1;

            let classification = self.policy.classify(&outcome);
            if classification != Classification::Retry || attempt >= max_attempts {
                return outcome.map_err(|source| AgentError::Transport {
                    url: spec.url.clone(),
                    source,
                });
            }

            let delay = self.policy.next_delay(attempt - 1);
            match &outcome {
                Ok(response) => tracing::warn!(
                    "{} {} returned {} (attempt {}/{}), retrying {} more times after {:?}",
                    spec.method,
                    spec.url,
                    response.status(),
                    attempt,
                    max_attempts,
                    max_attempts - attempt,
                    delay
                ),
                Err(err) => tracing::warn!(
                    "{} {} failed (attempt {}/{}): {}, retrying {} more times after {:?}",
                    spec.method,
                    spec.url,
                    attempt,
                    max_attempts,
                    err,
                    max_attempts - attempt,
                    delay
                ),
            }
            // Release the failed response before sleeping.
            drop(outcome);
            sleep(delay).await;
        }
    }
}
