//! `http-agent` is an async HTTP agent for tooling that has to fetch or push
//! many resources reliably.
//!
//! [`HttpAgent`] wraps GET, POST and HEAD with:
//! - retries with exponential backoff on transient failures, 429 and 5xx
//!   (except 501)
//! - group operations that run many requests in parallel, bounded by
//!   [`HttpAgent::with_max_parallel`], returning results in input order
//! - output as bytes, as raw [`Response`]s, or streamed into one or many
//!   `AsyncWrite` sinks
//!
//! ```no_run
//! use http_agent::{join_results, HttpAgent};
//!
//! # async fn run() -> http_agent::Result<()> {
//! let agent = HttpAgent::new().with_max_parallel(2);
//! let bodies = agent
//!     .get_group(&["https://example.com/a", "https://example.com/b"])
//!     .await;
//! let _bodies = join_results(bodies)?;
//! # Ok(())
//! # }
//! ```

mod backoff;
mod client;
mod error;
mod group;
mod options;
mod reader;
mod response;
mod retry;
mod transport;

pub use backoff::{classify_status, BackoffPolicy, Classification};
pub use client::HttpAgent;
pub use error::{AgentError, TransportError, TransportErrorKind};
pub use group::{dispatch_group, join_results, read_group, route_to_writers, GroupResult};
pub use options::{AgentOptions, DEFAULT_POST_CONTENT_TYPE};
pub use reader::{read_response, read_response_to_bytes};
pub use response::{Body, BoxStream, Response};
pub use retry::RetryingRequest;
pub use transport::{Method, ReqwestTransport, RequestSpec, Transport};

pub type Result<T> = std::result::Result<T, AgentError>;
