//! End-to-end broadcast tests: a relaycast router in front of real
//! upstream servers that record what they receive.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::StreamExt;
use http_body_util::BodyExt;
use tokio::sync::{mpsc, Semaphore};

use relaycast::buffer::RequestBuffer;
use relaycast::drain::DrainController;
use relaycast::ids::SequentialIds;
use relaycast::server::{self, AppState, Stats};
use relaycast::target::Target;

#[derive(Debug)]
struct Recorded {
    upstream: &'static str,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

#[derive(Clone)]
struct Upstream {
    name: &'static str,
    status: StatusCode,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    tx: mpsc::UnboundedSender<Recorded>,
}

impl Upstream {
    fn new(name: &'static str, status: StatusCode, tx: &mpsc::UnboundedSender<Recorded>) -> Self {
        Self {
            name,
            status,
            delay: Duration::ZERO,
            gate: None,
            tx: tx.clone(),
        }
    }
}

async fn upstream_handler(State(up): State<Upstream>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = body.collect().await.unwrap().to_bytes();
    let _ = up.tx.send(Recorded {
        upstream: up.name,
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
    });

    if let Some(gate) = &up.gate {
        let _permit = gate.acquire().await;
    }
    tokio::time::sleep(up.delay).await;

    (up.status, [("x-from", up.name)], format!("hello from {}", up.name)).into_response()
}

async fn spawn_upstream(up: Upstream) -> SocketAddr {
    let router = Router::new().fallback(upstream_handler).with_state(up);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// An address nothing listens on.
async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

struct Proxy {
    addr: SocketAddr,
    state: Arc<AppState>,
    _scratch: tempfile::TempDir,
}

impl Proxy {
    fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{path_and_query}", self.addr)
    }

    fn buffer_path(&self, request_id: &str) -> PathBuf {
        self.state.buffer.path_for(request_id)
    }

    async fn drained(&self) -> bool {
        self.state
            .drain
            .wait_for_zero_within(Duration::from_secs(5))
            .await
    }
}

struct ProxyOptions {
    timeout: Duration,
    scratch_subdir: Option<&'static str>,
    max_body: Option<usize>,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            scratch_subdir: None,
            max_body: None,
        }
    }
}

async fn spawn_proxy(targets: &[String]) -> Proxy {
    spawn_proxy_with(targets, ProxyOptions::default()).await
}

async fn spawn_proxy_with(targets: &[String], options: ProxyOptions) -> Proxy {
    let scratch = tempfile::tempdir().unwrap();
    let dir = match options.scratch_subdir {
        Some(sub) => scratch.path().join(sub),
        None => scratch.path().to_path_buf(),
    };

    let targets: Vec<Target> = targets.iter().map(|t| Target::parse(t).unwrap()).collect();
    let state = Arc::new(AppState {
        targets: targets.into(),
        http_client: server::build_http_client(),
        buffer: RequestBuffer::new(dir),
        drain: Arc::new(DrainController::new()),
        ids: Arc::new(SequentialIds::new("test")),
        timeout: options.timeout,
        stats: Arc::new(Stats::new()),
    });

    let router = server::build_router(state.clone(), options.max_body);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Proxy {
        addr,
        state,
        _scratch: scratch,
    }
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Recorded>) -> Recorded {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("upstream never received the request")
        .expect("upstream channel closed")
}

#[tokio::test]
async fn replicates_request_to_every_target() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let a = spawn_upstream(Upstream::new("a", StatusCode::CREATED, &tx)).await;
    let b = spawn_upstream(Upstream::new("b", StatusCode::OK, &tx)).await;
    let c = spawn_upstream(Upstream::new("c", StatusCode::OK, &tx)).await;

    let proxy = spawn_proxy(&[
        format!("http://{a}"),
        format!("http://{b}/server/base"),
        format!("http://{c}/fixed/endpoint#fixed"),
    ])
    .await;

    let resp = reqwest::Client::new()
        .post(proxy.url("/prefix/path?k=123&v=456"))
        .header("X-Test", "a")
        .header("X-Test", "b")
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(recv(&mut rx).await);
    }
    seen.sort_by_key(|r| r.upstream);

    let paths: Vec<String> = seen.iter().map(|r| r.uri.to_string()).collect();
    assert_eq!(
        paths,
        vec![
            "/prefix/path?k=123&v=456",
            "/server/base/prefix/path?k=123&v=456",
            "/fixed/endpoint?k=123&v=456",
        ]
    );

    for r in &seen {
        assert_eq!(r.method, Method::POST);
        assert_eq!(r.body, Bytes::from_static(b"payload"));
        let values: Vec<_> = r.headers.get_all("x-test").iter().collect();
        assert_eq!(values, vec!["a", "b"]);
        assert_eq!(r.headers.get("content-length").unwrap(), "7");
    }

    assert!(proxy.drained().await);
}

#[tokio::test]
async fn primary_response_is_relayed() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let primary = spawn_upstream(Upstream::new("primary", StatusCode::ACCEPTED, &tx)).await;
    let secondary = spawn_upstream(Upstream::new(
        "secondary",
        StatusCode::INTERNAL_SERVER_ERROR,
        &tx,
    ))
    .await;

    let proxy = spawn_proxy(&[format!("http://{primary}"), format!("http://{secondary}")]).await;

    let resp = reqwest::Client::new()
        .put(proxy.url("/items/1"))
        .body("{}")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 202);
    assert_eq!(resp.headers().get("x-from").unwrap(), "primary");
    assert_eq!(resp.text().await.unwrap(), "hello from primary");

    assert!(proxy.drained().await);
    let stats = &proxy.state.stats;
    assert_eq!(stats.broadcasts.load(Ordering::Relaxed), 1);
    assert_eq!(stats.primary_relayed.load(Ordering::Relaxed), 1);
    // An error status is still a delivered response
    assert_eq!(stats.secondary_failed.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn slow_secondary_does_not_hold_the_caller_but_holds_the_buffer() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let gate = Arc::new(Semaphore::new(0));

    let primary = spawn_upstream(Upstream::new("primary", StatusCode::OK, &tx)).await;
    let mut slow = Upstream::new("slow", StatusCode::OK, &tx);
    slow.gate = Some(gate.clone());
    let slow = spawn_upstream(slow).await;

    let proxy = spawn_proxy(&[format!("http://{primary}"), format!("http://{slow}")]).await;

    let resp = reqwest::Client::new()
        .post(proxy.url("/ingest"))
        .body("buffered bytes")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "hello from primary");

    // Both upstreams have the body; the slow one has not answered yet
    recv(&mut rx).await;
    recv(&mut rx).await;
    assert!(proxy.buffer_path("test-1").exists());
    assert_eq!(proxy.state.drain.in_flight(), 1);

    gate.add_permits(1);
    assert!(proxy.drained().await);
    assert!(!proxy.buffer_path("test-1").exists());
}

#[tokio::test]
async fn unreachable_primary_returns_bad_gateway() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let secondary = spawn_upstream(Upstream::new("secondary", StatusCode::OK, &tx)).await;
    let dead = closed_addr().await;

    let proxy = spawn_proxy(&[format!("http://{dead}"), format!("http://{secondary}")]).await;

    let resp = reqwest::Client::new()
        .post(proxy.url("/x"))
        .body("still delivered")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    assert_eq!(resp.text().await.unwrap(), "Bad gateway");

    let received = recv(&mut rx).await;
    assert_eq!(received.body, Bytes::from_static(b"still delivered"));

    assert!(proxy.drained().await);
    assert_eq!(proxy.state.stats.primary_failed.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn unreachable_secondary_is_invisible_to_the_caller() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let primary = spawn_upstream(Upstream::new("primary", StatusCode::OK, &tx)).await;
    let dead = closed_addr().await;

    let proxy = spawn_proxy(&[format!("http://{primary}"), format!("http://{dead}")]).await;

    let resp = reqwest::get(proxy.url("/")).await.unwrap();
    assert_eq!(resp.status(), 200);

    assert!(proxy.drained().await);
    assert_eq!(proxy.state.stats.secondary_failed.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn primary_timeout_returns_bad_gateway() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut slow = Upstream::new("slow", StatusCode::OK, &tx);
    slow.delay = Duration::from_secs(2);
    let slow = spawn_upstream(slow).await;

    let proxy = spawn_proxy_with(
        &[format!("http://{slow}")],
        ProxyOptions {
            timeout: Duration::from_millis(100),
            ..ProxyOptions::default()
        },
    )
    .await;

    let resp = reqwest::get(proxy.url("/")).await.unwrap();
    assert_eq!(resp.status(), 502);
    assert!(proxy.drained().await);
}

#[tokio::test]
async fn buffering_failure_returns_server_error() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let primary = spawn_upstream(Upstream::new("primary", StatusCode::OK, &tx)).await;

    let proxy = spawn_proxy_with(
        &[format!("http://{primary}")],
        ProxyOptions {
            scratch_subdir: Some("does/not/exist"),
            ..ProxyOptions::default()
        },
    )
    .await;

    let resp = reqwest::Client::new()
        .post(proxy.url("/"))
        .body("lost")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);

    assert!(proxy.drained().await);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn target_directives_rewrite_the_outbound_request() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let upstream = spawn_upstream(Upstream::new("a", StatusCode::OK, &tx)).await;

    let proxy = spawn_proxy(&[format!(
        "http://{upstream}/hook?Method=PATCH&Host=abc.com&X-Env=shadow&X-Env=canary#fixed"
    )])
    .await;

    let resp = reqwest::Client::new()
        .post(proxy.url("/ignored/path?q=1"))
        .header("X-Env", "prod")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let received = recv(&mut rx).await;
    assert_eq!(received.method, Method::PATCH);
    assert_eq!(received.uri.to_string(), "/hook?q=1");
    assert_eq!(received.headers.get("host").unwrap(), "abc.com");
    let env: Vec<_> = received.headers.get_all("x-env").iter().collect();
    assert_eq!(env, vec!["canary"]);
}

#[tokio::test]
async fn empty_body_is_forwarded_empty() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let upstream = spawn_upstream(Upstream::new("a", StatusCode::NO_CONTENT, &tx)).await;

    let proxy = spawn_proxy(&[format!("http://{upstream}")]).await;

    let resp = reqwest::get(proxy.url("/ping")).await.unwrap();
    assert_eq!(resp.status(), 204);

    let received = recv(&mut rx).await;
    assert_eq!(received.method, Method::GET);
    assert!(received.body.is_empty());
    assert!(proxy.drained().await);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let upstream = spawn_upstream(Upstream::new("a", StatusCode::OK, &tx)).await;

    let proxy = spawn_proxy_with(
        &[format!("http://{upstream}")],
        ProxyOptions {
            max_body: Some(4),
            ..ProxyOptions::default()
        },
    )
    .await;

    let resp = reqwest::Client::new()
        .post(proxy.url("/"))
        .body("far too long")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn concurrent_broadcasts_get_distinct_buffers() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let upstream = spawn_upstream(Upstream::new("a", StatusCode::OK, &tx)).await;
    let proxy = spawn_proxy(&[format!("http://{upstream}")]).await;

    let client = reqwest::Client::new();
    let sends = (0..8).map(|i| {
        client
            .post(proxy.url(&format!("/n/{i}")))
            .body(format!("body-{i}"))
            .send()
    });
    for resp in futures_util::future::join_all(sends).await {
        assert_eq!(resp.unwrap().status(), 200);
    }

    let mut bodies = Vec::new();
    for _ in 0..8 {
        let r = recv(&mut rx).await;
        let i = r.uri.path().trim_start_matches("/n/").to_string();
        assert_eq!(r.body, Bytes::from(format!("body-{i}")));
        bodies.push(i);
    }
    bodies.sort();
    bodies.dedup();
    assert_eq!(bodies.len(), 8);

    assert!(proxy.drained().await);
    for n in 1..=8 {
        assert!(!proxy.buffer_path(&format!("test-{n}")).exists());
    }
}

async fn partial_then_stall() -> Response {
    let chunks = futures_util::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(
        b"partial",
    ))])
    .chain(futures_util::stream::pending());
    axum::body::Body::from_stream(chunks).into_response()
}

#[tokio::test]
async fn stalled_primary_body_is_cut_at_the_deadline() {
    let router = Router::new().fallback(partial_then_stall);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let proxy = spawn_proxy_with(
        &[format!("http://{upstream}")],
        ProxyOptions {
            timeout: Duration::from_millis(200),
            ..ProxyOptions::default()
        },
    )
    .await;

    let resp = reqwest::Client::new()
        .post(proxy.url("/stream"))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let read = tokio::time::timeout(Duration::from_secs(3), resp.bytes())
        .await
        .expect("relayed body should end once the delivery times out");
    assert!(read.is_err());

    assert!(proxy.drained().await);
    assert_eq!(proxy.state.drain.in_flight(), 0);
    assert!(!proxy.buffer_path("test-1").exists());
}
