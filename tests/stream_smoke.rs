use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use futures_util::stream::{self, StreamExt};
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;
use tweetstream_sdk::stream::proto::{Status, StatusDeletionNotice, User};
use tweetstream_sdk::{
    BearerToken, ConnectionLifecycleListener, FilterQuery, NoAuth, StreamClient,
    StreamClientError, StreamConfig, StreamListener, StreamState,
};

const TEST_TOKEN: &str = "test-bearer-token";

struct Collector {
    tx: mpsc::UnboundedSender<String>,
}

impl Collector {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn push(&self, entry: String) {
        let _ = self.tx.send(entry);
    }
}

impl StreamListener for Collector {
    fn on_status(&self, status: &Status) {
        self.push(format!("status {} {}", status.id, status.text));
    }

    fn on_deletion_notice(&self, notice: &StatusDeletionNotice) {
        self.push(format!("delete {}", notice.status_id));
    }

    fn on_track_limitation_notice(&self, undelivered: u64) {
        self.push(format!("limit {undelivered}"));
    }

    fn on_follow(&self, source: &User, followed: &User) {
        self.push(format!("follow {} {}", source.screen_name, followed.screen_name));
    }

    fn on_exception(&self, error: &StreamClientError) {
        self.push(format!("exception {error}"));
    }
}

impl ConnectionLifecycleListener for Collector {
    fn on_connect(&self) {
        self.push("connect".to_string());
    }

    fn on_clean_up(&self) {
        self.push("clean_up".to_string());
    }
}

#[derive(Clone)]
struct FeedState {
    lines: Arc<Vec<&'static str>>,
    hits: Arc<AtomicUsize>,
    observed_tx: Arc<Mutex<Option<oneshot::Sender<HashMap<String, String>>>>>,
}

impl FeedState {
    fn new(lines: Vec<&'static str>) -> (Self, oneshot::Receiver<HashMap<String, String>>) {
        let (observed_tx, observed_rx) = oneshot::channel();
        let state = Self {
            lines: Arc::new(lines),
            hits: Arc::new(AtomicUsize::new(0)),
            observed_tx: Arc::new(Mutex::new(Some(observed_tx))),
        };
        (state, observed_rx)
    }

    async fn observe(&self, params: HashMap<String, String>) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = self.observed_tx.lock().await.take() {
            let _ = tx.send(params);
        }
    }

    fn kept_open_body(&self) -> Response {
        let lines: Vec<Result<String, Infallible>> = self
            .lines
            .iter()
            .map(|line| Ok(format!("{line}\r\n")))
            .collect();
        let body = stream::iter(lines).chain(stream::pending());
        Body::from_stream(body).into_response()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sample_stream_delivers_events_in_feed_order() {
    let (state, observed_rx) = FeedState::new(vec![
        r#"{"id":1,"text":"first"}"#,
        "",
        r#"{"delete":{"status":{"id":1,"user_id":3}}}"#,
        r#"{"limit":{"track":3}}"#,
        r#"{"id":2,"text":"second"}"#,
    ]);
    let app = Router::new()
        .route("/1.1/statuses/sample.json", get(sample_handler))
        .with_state(state);
    let (addr, shutdown_tx, server_task) = spawn_server(app).await;

    let auth = Arc::new(BearerToken::new(SecretString::new(TEST_TOKEN.to_string())));
    let mut client =
        StreamClient::with_options(config_for(addr), auth).expect("build stream client");
    let (collector, mut events) = Collector::new();
    client.add_listener(collector.clone());
    client.add_lifecycle_listener(collector);
    let raw_lines = Arc::new(AtomicUsize::new(0));
    let raw_counter = Arc::clone(&raw_lines);
    client.add_raw_listener(Arc::new(move |_line: &str| {
        raw_counter.fetch_add(1, Ordering::SeqCst);
    }));

    let handle = client.sample_language(["en"]).expect("start sample stream");

    let mut seen = Vec::new();
    for _ in 0..5 {
        let entry = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for stream event")
            .expect("listener channel closed");
        seen.push(entry);
    }
    assert_eq!(
        seen,
        vec![
            "connect".to_string(),
            "status 1 first".to_string(),
            "delete 1".to_string(),
            "limit 3".to_string(),
            "status 2 second".to_string(),
        ]
    );
    assert_eq!(raw_lines.load(Ordering::SeqCst), 4);
    assert_eq!(handle.state(), StreamState::Streaming);

    let params = timeout(Duration::from_secs(2), observed_rx)
        .await
        .expect("timed out waiting for request observation")
        .expect("observation channel closed");
    assert_eq!(params.get("language").map(String::as_str), Some("en"));
    assert_eq!(params.get("stall_warnings").map(String::as_str), Some("true"));

    timeout(Duration::from_secs(5), client.shutdown())
        .await
        .expect("client shutdown should finish");
    assert!(handle.is_closed());
    let last = events.recv().await.expect("clean up notification");
    assert_eq!(last, "clean_up");

    let _ = shutdown_tx.send(());
    server_task.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn forbidden_response_stops_the_worker() {
    let (state, _observed_rx) = FeedState::new(Vec::new());
    let hits = Arc::clone(&state.hits);
    let app = Router::new()
        .route("/1.1/statuses/filter.json", post(forbidden_handler))
        .with_state(state);
    let (addr, shutdown_tx, server_task) = spawn_server(app).await;

    let mut client = StreamClient::with_options(config_for(addr), Arc::new(NoAuth))
        .expect("build stream client");
    let (collector, mut events) = Collector::new();
    client.add_listener(collector.clone());
    client.add_lifecycle_listener(collector);

    let handle = client.filter_track(["rust"]).expect("start filter stream");
    timeout(Duration::from_secs(5), handle.closed())
        .await
        .expect("worker should stop after 403");

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(
        events.recv().await.as_deref(),
        Some("exception http status 403: not permitted")
    );
    assert_eq!(events.recv().await.as_deref(), Some("clean_up"));

    let _ = shutdown_tx.send(());
    server_task.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn filter_posts_form_params_and_user_stream_gets_social_events() {
    let (state, observed_rx) = FeedState::new(vec![
        r#"{"event":"follow","source":{"id":1,"screen_name":"alice"},"target":{"id":2,"screen_name":"bob"}}"#,
    ]);
    let app = Router::new()
        .route("/1.1/statuses/filter.json", post(form_handler))
        .route("/1.1/user.json", post(form_handler))
        .with_state(state);
    let (addr, shutdown_tx, server_task) = spawn_server(app).await;

    let auth = Arc::new(BearerToken::new(SecretString::new(TEST_TOKEN.to_string())));
    let config = config_for(addr).with_user_stream_replies_all(true);
    let mut client = StreamClient::with_options(config, auth).expect("build stream client");
    let (collector, mut events) = Collector::new();
    client.add_listener(collector.clone());
    client.add_lifecycle_listener(collector);

    client
        .filter(FilterQuery::of_track(["rust", "tokio"]).follow([7, 8]))
        .expect("start filter stream");
    let params = timeout(Duration::from_secs(5), observed_rx)
        .await
        .expect("timed out waiting for form observation")
        .expect("observation channel closed");
    assert_eq!(params.get("track").map(String::as_str), Some("rust,tokio"));
    assert_eq!(params.get("follow").map(String::as_str), Some("7,8"));
    assert_eq!(params.get("stall_warnings").map(String::as_str), Some("true"));

    // Status streams drop social events, so only the connect shows up.
    assert_eq!(
        timeout(Duration::from_secs(5), events.recv()).await.ok().flatten().as_deref(),
        Some("connect")
    );

    client.user().expect("start user stream");
    let mut seen = Vec::new();
    while seen.len() < 3 {
        let entry = timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for user stream event")
            .expect("listener channel closed");
        seen.push(entry);
    }
    assert_eq!(
        seen,
        vec![
            "clean_up".to_string(),
            "connect".to_string(),
            "follow alice bob".to_string(),
        ]
    );

    timeout(Duration::from_secs(5), client.shutdown())
        .await
        .expect("client shutdown should finish");
    let _ = shutdown_tx.send(());
    server_task.abort();
}

fn config_for(addr: SocketAddr) -> StreamConfig {
    StreamConfig::default()
        .with_base_url(format!("http://{addr}/1.1"))
        .with_stall_timeout(Some(Duration::from_secs(30)))
}

async fn sample_handler(
    State(state): State<FeedState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let expected = format!("Bearer {TEST_TOKEN}");
    let authorized = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
    }
    state.observe(params).await;
    state.kept_open_body()
}

async fn forbidden_handler(State(state): State<FeedState>) -> Response {
    state.observe(HashMap::new()).await;
    (StatusCode::FORBIDDEN, r#"{"error":"not permitted"}"#).into_response()
}

async fn form_handler(
    State(state): State<FeedState>,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    state.observe(params).await;
    state.kept_open_body()
}

async fn spawn_server(
    app: Router,
) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server listener");
    let addr = listener
        .local_addr()
        .expect("read mock server listener address");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("mock server should run");
    });
    (addr, shutdown_tx, task)
}
