use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{AgentError, Response, Result};

/// Copies the whole body of `response` into `sink`, then applies the status policy.
///
/// The response is consumed, so its body is released on every path. A failed
/// copy is reported as [`AgentError::Read`] whatever `fail_on_http_error` says;
/// a status outside `200..300` becomes [`AgentError::Http`] only when
/// `fail_on_http_error` is set and is otherwise logged.
pub async fn read_response<W>(
    response: Response,
    sink: &mut W,
    fail_on_http_error: bool,
) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let status = response.status();
    let url = response.url().to_owned();
    let mut body = response.into_body();

    while let Some(chunk) = body.chunk().await {
        let chunk = chunk.map_err(|err| AgentError::Read {
            url: url.clone(),
            source: Box::new(err),
        })?;
        sink.write_all(&chunk)
            .await
            .map_err(|err| AgentError::Read {
                url: url.clone(),
                source: Box::new(err),
            })?;
    }
    drop(body);

    sink.flush().await.map_err(|err| AgentError::Read {
        url: url.clone(),
        source: Box::new(err),
    })?;

    if !status.is_success() {
        if fail_on_http_error {
            return Err(AgentError::Http { status, url });
        }
        tracing::warn!("got HTTP error {status} for {url} but fail_on_http_error is not set");
    }

    Ok(())
}

/// Reads the response into memory. See [`read_response`] for the status policy.
pub async fn read_response_to_bytes(
    response: Response,
    fail_on_http_error: bool,
) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    read_response(response, &mut buffer, fail_on_http_error).await?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use bytes::Bytes;
    use futures_util::stream;
    use reqwest::StatusCode;
    use tokio::io::AsyncWrite;

    use super::{read_response, read_response_to_bytes};
    use crate::{AgentError, Body, Response, TransportError, TransportErrorKind};

    struct BrokenSink;

    impl AsyncWrite for BrokenSink {
        fn poll_write(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
            _: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed")))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn response(status: StatusCode) -> Response {
        Response::new(status, "http://host/file").with_body("hello agent!")
    }

    #[tokio::test]
    async fn success_copies_body() {
        let bytes = read_response_to_bytes(response(StatusCode::OK), true)
            .await
            .expect("read must succeed");
        assert_eq!(bytes, b"hello agent!");
    }

    #[tokio::test]
    async fn http_error_fails_only_when_configured() {
        let err = read_response_to_bytes(response(StatusCode::NOT_FOUND), true)
            .await
            .expect_err("404 must fail");
        match err {
            AgentError::Http { status, url } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(url, "http://host/file");
            }
            other => panic!("expected http error, got {other:?}"),
        }

        let bytes = read_response_to_bytes(response(StatusCode::NOT_FOUND), false)
            .await
            .expect("404 must be tolerated");
        assert_eq!(bytes, b"hello agent!");
    }

    #[tokio::test]
    async fn sink_failure_is_read_error_even_when_tolerating_status() {
        let err = read_response(response(StatusCode::NOT_FOUND), &mut BrokenSink, false)
            .await
            .expect_err("broken sink must fail");
        assert!(matches!(err, AgentError::Read { .. }));
    }

    #[tokio::test]
    async fn body_stream_failure_is_read_error() {
        let chunks = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(TransportError::new(TransportErrorKind::Body, "reset")),
        ];
        let response = Response::new(StatusCode::OK, "http://host/file")
            .with_body(Body::from_stream(stream::iter(chunks)));

        let mut sink = Vec::new();
        let err = read_response(response, &mut sink, true)
            .await
            .expect_err("stream error must fail");
        assert!(matches!(err, AgentError::Read { .. }));
        assert_eq!(sink, b"abc");
    }
}
