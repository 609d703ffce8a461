use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use reelcache::{
    error::FetchError,
    models::EntityKind,
    services::{CatalogProvider, RetryPolicy, TmdbClient},
};

const BACKOFF: Duration = Duration::from_millis(50);

/// Records every hit so tests can count attempts and measure the gaps between them
#[derive(Default)]
struct HitLog {
    hits: AtomicUsize,
    times: Mutex<Vec<Instant>>,
}

impl HitLog {
    fn hit(&self) -> usize {
        self.times.lock().unwrap().push(Instant::now());
        self.hits.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn gaps(&self) -> Vec<Duration> {
        let times = self.times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

type Shared = State<Arc<HitLog>>;

async fn always_rate_limited(State(log): Shared) -> StatusCode {
    log.hit();
    StatusCode::TOO_MANY_REQUESTS
}

async fn fails_once(State(log): Shared) -> impl IntoResponse {
    if log.hit() == 1 {
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    } else {
        Json(json!({"id": 550, "title": "Fight Club"})).into_response()
    }
}

async fn missing(State(log): Shared) -> StatusCode {
    log.hit();
    StatusCode::NOT_FOUND
}

async fn unauthorized(State(log): Shared) -> impl IntoResponse {
    log.hit();
    (StatusCode::UNAUTHORIZED, "Invalid API key")
}

async fn echo(State(log): Shared, Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    log.hit();
    Json(json!({ "params": params }))
}

async fn slow_once(State(log): Shared) -> Json<Value> {
    if log.hit() == 1 {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    Json(json!({"ok": true}))
}

async fn garbage_once(State(log): Shared) -> impl IntoResponse {
    if log.hit() == 1 {
        (StatusCode::OK, "<html>not json</html>").into_response()
    } else {
        Json(json!({"ok": true})).into_response()
    }
}

async fn genre_list(State(log): Shared) -> Json<Value> {
    log.hit();
    Json(json!({"genres": [{"id": 28, "name": "Action"}, {"id": 18, "name": "Drama"}]}))
}

async fn no_results(State(log): Shared) -> Json<Value> {
    log.hit();
    Json(json!({"page": 1}))
}

/// Starts a fake provider on an ephemeral port and returns its base URL
async fn spawn_provider(log: Arc<HitLog>) -> String {
    let app = Router::new()
        .route("/rate-limited", get(always_rate_limited))
        .route("/flaky", get(fails_once))
        .route("/missing", get(missing))
        .route("/unauthorized", get(unauthorized))
        .route("/echo", get(echo))
        .route("/slow", get(slow_once))
        .route("/garbage", get(garbage_once))
        .route("/genre/movie/list", get(genre_list))
        .route("/trending/tv/week", get(no_results))
        .with_state(log);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/", addr)
}

async fn client_for(log: Arc<HitLog>, timeout: Duration) -> TmdbClient {
    let url = spawn_provider(log).await;
    TmdbClient::new(
        "test-key".to_string(),
        url,
        timeout,
        RetryPolicy {
            max_attempts: 3,
            backoff_base: BACKOFF,
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_rate_limit_exhausts_attempts_with_growing_backoff() {
    let log = Arc::new(HitLog::default());
    let client = client_for(log.clone(), Duration::from_secs(5)).await;

    let result = client.fetch("/rate-limited", &[]).await;

    assert!(matches!(result, Err(FetchError::Unavailable { .. })));
    assert_eq!(log.count(), 3);

    let gaps = log.gaps();
    assert_eq!(gaps.len(), 2);
    assert!(gaps[0] >= BACKOFF);
    assert!(gaps[1] >= BACKOFF * 2);
}

#[tokio::test]
async fn test_server_error_then_success() {
    let log = Arc::new(HitLog::default());
    let client = client_for(log.clone(), Duration::from_secs(5)).await;

    let payload = client.fetch("/flaky", &[]).await.unwrap();

    assert_eq!(payload["title"], "Fight Club");
    assert_eq!(log.count(), 2);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let log = Arc::new(HitLog::default());
    let client = client_for(log.clone(), Duration::from_secs(5)).await;

    let result = client.fetch("/missing", &[]).await;

    assert!(matches!(result, Err(FetchError::NotFound { .. })));
    assert_eq!(log.count(), 1);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let log = Arc::new(HitLog::default());
    let client = client_for(log.clone(), Duration::from_secs(5)).await;

    let result = client.fetch("/unauthorized", &[]).await;

    match result {
        Err(FetchError::Unavailable { reason, .. }) => assert!(reason.contains("401")),
        other => panic!("expected Unavailable, got {:?}", other),
    }
    assert_eq!(log.count(), 1);
}

#[tokio::test]
async fn test_api_key_and_params_are_sent() {
    let log = Arc::new(HitLog::default());
    let client = client_for(log.clone(), Duration::from_secs(5)).await;

    let payload = client
        .fetch("/echo", &[("query", "fight club"), ("page", "2")])
        .await
        .unwrap();

    assert_eq!(payload["params"]["api_key"], "test-key");
    assert_eq!(payload["params"]["query"], "fight club");
    assert_eq!(payload["params"]["page"], "2");
}

#[tokio::test]
async fn test_timeout_is_retried() {
    let log = Arc::new(HitLog::default());
    let client = client_for(log.clone(), Duration::from_millis(100)).await;

    let payload = client.fetch("/slow", &[]).await.unwrap();

    assert_eq!(payload["ok"], true);
    assert_eq!(log.count(), 2);
}

#[tokio::test]
async fn test_undecodable_body_is_retried() {
    let log = Arc::new(HitLog::default());
    let client = client_for(log.clone(), Duration::from_secs(5)).await;

    let payload = client.fetch("/garbage", &[]).await.unwrap();

    assert_eq!(payload["ok"], true);
    assert_eq!(log.count(), 2);
}

#[tokio::test]
async fn test_genre_list_reads_genres_key() {
    let log = Arc::new(HitLog::default());
    let client = client_for(log.clone(), Duration::from_secs(5)).await;

    let genres = client.genre_list(EntityKind::Movie).await.unwrap();

    assert_eq!(genres.len(), 2);
    assert_eq!(genres[0]["name"], "Action");
}

#[tokio::test]
async fn test_list_without_results_key_is_empty() {
    let log = Arc::new(HitLog::default());
    let client = client_for(log.clone(), Duration::from_secs(5)).await;

    let shows = client.trending(EntityKind::TvShow).await.unwrap();

    assert!(shows.is_empty());
    assert_eq!(log.count(), 1);
}
