//! Mock upstream LLM server
//!
//! A minimal OpenAI-compatible endpoint with canned responses, a
//! fail-first counter for fallback tests, and request counting.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use tokio_util::sync::CancellationToken;

pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    completion_count: AtomicU32,
    embedding_count: AtomicU32,
    /// Requests to fail with 500 before succeeding; `u32::MAX` fails forever
    fail_count: AtomicU32,
    response_content: String,
}

impl MockLlm {
    /// Start a mock that answers every completion with `content`
    pub async fn start(content: &str) -> anyhow::Result<Self> {
        Self::start_inner(0, content).await
    }

    /// Start a mock that fails every completion with 500
    pub async fn start_always_failing() -> anyhow::Result<Self> {
        Self::start_inner(u32::MAX, "unreachable").await
    }

    async fn start_inner(fail_count: u32, content: &str) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            completion_count: AtomicU32::new(0),
            embedding_count: AtomicU32::new(0),
            fail_count: AtomicU32::new(fail_count),
            response_content: content.to_owned(),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_completions))
            .route("/v1/embeddings", routing::post(handle_embeddings))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL to store on the provider row (no `/v1`; normalization
    /// appends it for OpenAI-compatible providers)
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn completion_count(&self) -> u32 {
        self.state.completion_count.load(Ordering::Relaxed)
    }

    pub fn embedding_count(&self) -> u32 {
        self.state.embedding_count.load(Ordering::Relaxed)
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_completions(
    State(state): State<Arc<MockState>>,
    Json(request): Json<serde_json::Value>,
) -> impl IntoResponse {
    state.completion_count.fetch_add(1, Ordering::Relaxed);

    let remaining = state.fail_count.load(Ordering::Relaxed);
    if remaining > 0 {
        if remaining != u32::MAX {
            state.fail_count.fetch_sub(1, Ordering::Relaxed);
        }
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": { "message": "mock upstream failure", "type": "server_error" }
            })),
        )
            .into_response();
    }

    let model = request
        .get("model")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("mock-model");

    if request.get("stream").and_then(serde_json::Value::as_bool) == Some(true) {
        return streaming_body(&state.response_content, model).into_response();
    }

    Json(serde_json::json!({
        "id": "chatcmpl-mock-1",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": state.response_content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
    }))
    .into_response()
}

/// SSE body with one chunk per whitespace-separated word
fn streaming_body(content: &str, model: &str) -> impl IntoResponse {
    let mut body = String::new();

    for word in content.split_whitespace() {
        let chunk = serde_json::json!({
            "id": "chatcmpl-mock-stream",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": model,
            "choices": [{ "index": 0, "delta": { "content": format!("{word} ") } }]
        });
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
        body,
    )
}

async fn handle_embeddings(
    State(state): State<Arc<MockState>>,
    Json(request): Json<serde_json::Value>,
) -> impl IntoResponse {
    state.embedding_count.fetch_add(1, Ordering::Relaxed);

    let model = request
        .get("model")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("mock-embedding");

    Json(serde_json::json!({
        "object": "list",
        "data": [{ "object": "embedding", "embedding": [0.1, 0.2, 0.3], "index": 0 }],
        "model": model,
        "usage": { "prompt_tokens": 8, "total_tokens": 8 }
    }))
}
