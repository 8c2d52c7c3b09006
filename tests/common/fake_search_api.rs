//! Fake search API server for integration tests.
//!
//! Spins up a minimal `axum` HTTP server on a random TCP port bound to
//! 127.0.0.1. Serves `POST /{index}/{doc_type}/_search` and
//! `POST /{index}/_search`, answering with the configured hits every time
//! and recording every request for later inspection.
//!
//! # Example
//!
//! ```rust,no_run
//! let api = FakeSearchApi::start().await.unwrap();
//! api.add_hit("doc-1", serde_json::json!({ "message": "hello" })).await;
//! // Point a search receiver at api.base_url()
//! ```

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// A request as the fake server saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub body: Value,
}

#[derive(Default)]
struct ApiState {
    hits: Vec<Value>,
    requests: Vec<RecordedRequest>,
    fail_with: Option<StatusCode>,
}

/// Handle to the running fake search API server.
pub struct FakeSearchApi {
    addr: SocketAddr,
    state: Arc<Mutex<ApiState>>,
}

impl FakeSearchApi {
    /// Start the server on a random port. Returns once it is listening.
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(ApiState::default()));

        let app = Router::new()
            .route("/{index}/{doc_type}/_search", post(search_typed))
            .route("/{index}/_search", post(search_untyped))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the task a moment to register.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        Ok(Self { addr, state })
    }

    /// Base URL for the API (e.g. `http://127.0.0.1:PORT`).
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Add a document to every future response.
    pub async fn add_hit(&self, id: &str, source: Value) {
        self.state.lock().await.hits.push(json!({
            "_id": id,
            "_index": "logstash-2024.01.15",
            "_type": "logevent",
            "_source": source,
        }));
    }

    /// Answer every future request with `status` and an error body.
    pub async fn fail_with(&self, status: StatusCode) {
        self.state.lock().await.fail_with = Some(status);
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().await.requests.clone()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

async fn search_typed(
    Path((index, doc_type)): Path<(String, String)>,
    State(state): State<Arc<Mutex<ApiState>>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    respond(&state, format!("/{index}/{doc_type}/_search"), body).await
}

async fn search_untyped(
    Path(index): Path<String>,
    State(state): State<Arc<Mutex<ApiState>>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    respond(&state, format!("/{index}/_search"), body).await
}

async fn respond(state: &Mutex<ApiState>, path: String, body: Value) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().await;
    state.requests.push(RecordedRequest { path, body });
    if let Some(status) = state.fail_with {
        return (status, Json(json!({ "error": "index_not_found_exception" })));
    }
    let hits = state.hits.clone();
    (StatusCode::OK, Json(json!({ "took": 1, "hits": { "total": hits.len(), "hits": hits } })))
}
