//! Bounded parallel dispatch of request groups and routing of their responses.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::io::AsyncWrite;
use tokio::sync::Semaphore;

use crate::{
    reader::{read_response, read_response_to_bytes},
    retry::RetryingRequest,
    AgentError, RequestSpec, Response, Result,
};

/// Index-aligned outcomes of a group operation.
pub type GroupResult = Vec<Result<Response>>;

/// Runs every spec through `request` with at most `max_parallel` in flight.
///
/// One task is spawned per spec. A task takes a semaphore permit before its
/// first attempt and keeps it through backoff sleeps until its outcome is
/// ready. Outcomes come back through the join handles, awaited in input
/// order, so slot `i` always belongs to `specs[i]` and no shared container
/// is written concurrently. A failing member never cancels its siblings.
pub async fn dispatch_group(
    request: &RetryingRequest,
    specs: Vec<RequestSpec>,
    max_parallel: usize,
) -> GroupResult {
    let permits = Arc::new(Semaphore::new(max_parallel.max(1)));

    let handles: Vec<_> = specs
        .into_iter()
        .enumerate()
        .map(|(index, spec)| {
            let request = request.clone();
            let permits = Arc::clone(&permits);
            tokio::spawn(async move {
                match permits.acquire_owned().await {
                    Ok(_permit) => request.execute(&spec).await,
                    Err(_) => Err(AgentError::TaskFailed {
                        index,
                        message: "admission semaphore closed".to_owned(),
                    }),
                }
            })
        })
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .enumerate()
        .map(|(index, joined)| {
            joined.unwrap_or_else(|err| {
                Err(AgentError::TaskFailed {
                    index,
                    message: err.to_string(),
                })
            })
        })
        .collect()
}

/// Result for every slot when URL and payload counts differ; nothing is sent.
pub(crate) fn mismatched_payloads<T>(urls: usize, payloads: usize) -> Vec<Result<T>> {
    (0..urls)
        .map(|_| Err(AgentError::MismatchedPayloads { urls, payloads }))
        .collect()
}

/// Reads every response of a group into memory, in input order.
pub async fn read_group(outcomes: GroupResult, fail_on_http_error: bool) -> Vec<Result<Vec<u8>>> {
    let mut contents = Vec::with_capacity(outcomes.len());
    for (index, outcome) in outcomes.into_iter().enumerate() {
        let content = match outcome {
            Ok(response) => read_response_to_bytes(response, fail_on_http_error)
                .await
                .map_err(|err| member_error(index, err)),
            Err(err) => Err(err),
        };
        contents.push(content);
    }
    contents
}

/// Writes group responses to `writers`.
///
/// With exactly one writer every response is written to it sequentially in
/// input order. Otherwise response `i` goes to `writers[i]`, and slots without
/// a writer fail with [`AgentError::NoWriter`]. Slots that already hold a
/// dispatch error keep it and are not routed.
pub async fn route_to_writers<W>(
    writers: &mut [W],
    outcomes: GroupResult,
    fail_on_http_error: bool,
) -> Vec<Result<()>>
where
    W: AsyncWrite + Unpin,
{
    let single = writers.len() == 1;
    let mut results = Vec::with_capacity(outcomes.len());

    for (index, outcome) in outcomes.into_iter().enumerate() {
        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                results.push(Err(err));
                continue;
            }
        };

        let writer = if single {
            writers.first_mut()
        } else {
            writers.get_mut(index)
        };
        let result = match writer {
            Some(writer) => read_response(response, writer, fail_on_http_error)
                .await
                .map_err(|err| member_error(index, err)),
            None => Err(AgentError::NoWriter { index }),
        };
        results.push(result);
    }

    results
}

/// Folds a group result into one value, or one [`AgentError::Group`] listing
/// every failed slot.
pub fn join_results<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut values = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(value) => values.push(value),
            Err(err) => failures.push((index, err)),
        }
    }
    if failures.is_empty() {
        Ok(values)
    } else {
        Err(AgentError::Group(failures))
    }
}

fn member_error(index: usize, err: AgentError) -> AgentError {
    AgentError::Member {
        index,
        source: Box::new(err),
    }
}
