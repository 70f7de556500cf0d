use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use http_agent::{join_results, AgentError, HttpAgent, TransportErrorKind};

#[derive(Clone)]
struct MockResponse {
    status: StatusCode,
    body: &'static str,
}

impl MockResponse {
    fn new(status: StatusCode, body: &'static str) -> Self {
        Self { status, body }
    }
}

#[derive(Clone)]
struct MockState {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    hits: Arc<AtomicUsize>,
}

async fn scripted_handler(State(state): State<MockState>) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let response = {
        let mut queue = state
            .responses
            .lock()
            .expect("response queue mutex must not be poisoned");
        queue.pop_front().unwrap_or_else(|| {
            MockResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "no mock response available")
        })
    };

    (response.status, response.body)
}

async fn ok_handler() -> impl IntoResponse {
    "hello agent!"
}

async fn missing_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "nothing here")
}

async fn slow_handler(Path(ms): Path<u64>) -> impl IntoResponse {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    format!("[{ms}]")
}

async fn echo_handler(headers: HeaderMap, body: String) -> impl IntoResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_owned();
    format!("{content_type}|{body}")
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

async fn spawn_server(responses: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        responses: Arc::new(Mutex::new(responses.into())),
        hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .route("/scripted", get(scripted_handler).post(scripted_handler))
        .route("/ok", get(ok_handler))
        .route("/missing", get(missing_handler))
        .route("/slow/:ms", get(slow_handler))
        .route("/echo", post(echo_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        task,
    }
}

fn quick_agent() -> HttpAgent {
    HttpAgent::new()
        .with_timeout(Duration::from_secs(2))
        .with_wait_time(Duration::from_millis(1))
}

#[tokio::test]
async fn get_returns_body() {
    let server = spawn_server(Vec::new()).await;

    let body = quick_agent()
        .get(&server.url("/ok"))
        .await
        .expect("get must succeed");

    assert_eq!(body, b"hello agent!");
}

#[tokio::test]
async fn get_text_trims_when_asked() {
    let server = spawn_server(vec![MockResponse::new(StatusCode::OK, "  padded text \n")]).await;

    let text = quick_agent()
        .get_text(&server.url("/scripted"), true)
        .await
        .expect("get_text must succeed");

    assert_eq!(text, "padded text");
}

#[tokio::test]
async fn retries_on_retryable_http_status() {
    let server = spawn_server(vec![
        MockResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
        MockResponse::new(StatusCode::OK, "recovered"),
    ])
    .await;

    let agent = HttpAgent::new()
        .with_retries(3)
        .with_wait_time(Duration::from_millis(10));

    let started = Instant::now();
    let body = agent
        .get(&server.url("/scripted"))
        .await
        .expect("request must succeed after retry");

    assert_eq!(body, b"recovered");
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
    assert!(started.elapsed() >= Duration::from_millis(10));
}

#[tokio::test]
async fn not_implemented_is_not_retried() {
    let server = spawn_server(vec![
        MockResponse::new(StatusCode::NOT_IMPLEMENTED, "nope"),
        MockResponse::new(StatusCode::OK, "unreachable"),
    ])
    .await;

    let err = quick_agent()
        .with_retries(5)
        .get(&server.url("/scripted"))
        .await
        .expect_err("501 must fail");

    assert_eq!(err.status(), Some(StatusCode::NOT_IMPLEMENTED));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn http_error_policy_controls_failure() {
    let server = spawn_server(Vec::new()).await;
    let url = server.url("/missing");

    let err = quick_agent()
        .with_fail_on_http_error(true)
        .get(&url)
        .await
        .expect_err("404 must fail");
    match err {
        AgentError::Http { status, url: failed } => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(failed, url);
        }
        other => panic!("expected http error, got {other:?}"),
    }

    let body = quick_agent()
        .with_fail_on_http_error(false)
        .get(&url)
        .await
        .expect("404 must be tolerated");
    assert_eq!(body, b"nothing here");
}

#[tokio::test]
async fn post_sends_payload_with_content_type() {
    let server = spawn_server(Vec::new()).await;

    let body = quick_agent()
        .with_post_content_type("text/plain")
        .post(&server.url("/echo"), "payload")
        .await
        .expect("post must succeed");

    assert_eq!(body, b"text/plain|payload");
}

#[tokio::test]
async fn post_defaults_to_octet_stream() {
    let server = spawn_server(Vec::new()).await;
    let mut sink = Vec::new();

    quick_agent()
        .post_to_writer(&mut sink, &server.url("/echo"), b"raw".to_vec())
        .await
        .expect("post must succeed");

    assert_eq!(sink, b"application/octet-stream|raw");
}

#[tokio::test]
async fn head_returns_status_without_body() {
    let server = spawn_server(Vec::new()).await;

    let response = quick_agent()
        .head_request(&server.url("/ok"))
        .await
        .expect("head must succeed");
    assert_eq!(response.status(), StatusCode::OK);

    let body = quick_agent()
        .head(&server.url("/ok"))
        .await
        .expect("head must succeed");
    assert!(body.is_empty());
}

#[tokio::test]
async fn request_timeout_surfaces_transport_error() {
    let server = spawn_server(Vec::new()).await;

    let err = HttpAgent::new()
        .with_timeout(Duration::from_millis(20))
        .with_retries(0)
        .get(&server.url("/slow/300"))
        .await
        .expect_err("request must time out");

    match err {
        AgentError::Transport { source, .. } => {
            assert_eq!(source.kind(), TransportErrorKind::Timeout)
        }
        other => panic!("expected transport timeout error, got {other:?}"),
    }
}

#[tokio::test]
async fn zero_timeout_means_no_timeout() {
    let server = spawn_server(Vec::new()).await;

    let body = HttpAgent::new()
        .with_timeout(Duration::ZERO)
        .with_retries(0)
        .get(&server.url("/slow/50"))
        .await
        .expect("request without a timeout must succeed");

    assert_eq!(body, b"[50]");
}

#[tokio::test]
async fn invalid_url_is_not_retried() {
    let err = quick_agent()
        .with_retries(3)
        .get("not a url")
        .await
        .expect_err("invalid url must fail");

    match err {
        AgentError::Transport { url, source } => {
            assert_eq!(url, "not a url");
            assert_eq!(source.kind(), TransportErrorKind::InvalidUrl);
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn group_to_single_writer_keeps_input_order() {
    let server = spawn_server(Vec::new()).await;
    let urls = vec![
        server.url("/slow/120"),
        server.url("/slow/60"),
        server.url("/slow/1"),
    ];
    let mut writers = vec![Vec::new()];

    let results = quick_agent()
        .with_max_parallel(3)
        .get_to_writer_group(&mut writers, &urls)
        .await;

    join_results(results).expect("every request must succeed");
    assert_eq!(writers[0], b"[120][60][1]");
}

#[tokio::test]
async fn group_get_reports_each_slot() {
    let server = spawn_server(Vec::new()).await;
    let urls = vec![server.url("/ok"), server.url("/missing"), server.url("/ok")];

    let results = quick_agent().get_group(&urls).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_deref().ok(), Some(&b"hello agent!"[..]));
    assert_eq!(
        results[1].as_ref().err().and_then(AgentError::status),
        Some(StatusCode::NOT_FOUND)
    );
    assert!(results[2].is_ok());
}
