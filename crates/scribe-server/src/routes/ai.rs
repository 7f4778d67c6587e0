//! Task invocation endpoints: sync chat, SSE streaming, embeddings
//!
//! Every invocation records request metrics and a durable usage row,
//! on success and failure alike; usage-write failures stay invisible to
//! the caller by design.

use std::collections::BTreeMap;
use std::time::Instant;

use axum::Json;
use axum::extract::{OriginalUri, Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::{Stream, StreamExt};
use scribe_llm::{DispatchError, StreamEvent, TaskCall};
use scribe_usage::{RequestMetric, UsageRecord, estimate_tokens};
use serde::{Deserialize, Serialize};

use crate::error::error_response;
use crate::extract::CallerId;
use crate::state::AppState;

/// Body of a task invocation
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    /// Content to operate on (summarize, tag, polish, translate, ...)
    #[serde(default)]
    pub content: Option<String>,
    /// Topic to generate from (outline, titles)
    #[serde(default)]
    pub topic: Option<String>,
    /// Prompt template override for this invocation
    #[serde(default)]
    pub prompt_template: Option<String>,
    /// Explicit model override
    #[serde(default)]
    pub model_id: Option<String>,
    /// Provider scope for the model override
    #[serde(default)]
    pub provider_code: Option<String>,
}

/// Response of a non-streaming task invocation
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub result_text: String,
    pub model_used: String,
    pub tokens_used: u64,
    pub latency_ms: u64,
}

impl TaskRequest {
    fn into_call(self, task_alias: String, user_id: Option<i64>) -> Result<(TaskCall, String), DispatchError> {
        let mut variables = BTreeMap::new();
        if let Some(content) = &self.content {
            variables.insert("content".to_owned(), content.clone());
        }
        if let Some(topic) = &self.topic {
            variables.insert("topic".to_owned(), topic.clone());
        }

        let request_text = self.content.or(self.topic).ok_or_else(|| {
            DispatchError::InvalidRequest("either content or topic is required".to_owned())
        })?;

        Ok((
            TaskCall {
                variables,
                task_alias,
                user_id,
                custom_prompt: self.prompt_template,
                model_id: self.model_id,
                provider_code: self.provider_code,
            },
            request_text,
        ))
    }
}

/// Handle `POST /api/ai/{task}`
pub async fn invoke(
    State(state): State<AppState>,
    Path(task): Path<String>,
    CallerId(user_id): CallerId,
    OriginalUri(uri): OriginalUri,
    Json(body): Json<TaskRequest>,
) -> Response {
    let endpoint = uri.path().to_owned();
    let request_id = scribe_core::RequestContext::new(user_id, endpoint.clone()).request_id;

    let (call, request_text) = match body.into_call(task.clone(), user_id) {
        Ok(parts) => parts,
        Err(e) => return error_response(&e),
    };

    let start = Instant::now();
    let result = state.llm().chat(&call).await;
    let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    match result {
        Ok(outcome) => {
            let tokens_in = outcome
                .tokens_in
                .map_or_else(|| estimate_tokens(&request_text), |t| t as usize);
            let tokens_out = outcome
                .tokens_out
                .map_or_else(|| estimate_tokens(&outcome.content), |t| t as usize);

            record_request(
                &state,
                RequestParts {
                    endpoint,
                    task: &task,
                    user_id,
                    model: Some(outcome.model.clone()),
                    request_chars: request_text.chars().count(),
                    response_chars: outcome.content.chars().count(),
                    tokens_in,
                    tokens_out,
                    latency_ms,
                    input_cost_per_1k: outcome.input_cost_per_1k,
                    output_cost_per_1k: outcome.output_cost_per_1k,
                    error_code: None,
                    request_id,
                },
            )
            .await;

            Json(TaskResponse {
                result_text: outcome.content,
                model_used: outcome.model,
                tokens_used: (tokens_in + tokens_out) as u64,
                latency_ms,
            })
            .into_response()
        }
        Err(e) => {
            record_request(
                &state,
                RequestParts {
                    endpoint,
                    task: &task,
                    user_id,
                    model: None,
                    request_chars: request_text.chars().count(),
                    response_chars: 0,
                    tokens_in: estimate_tokens(&request_text),
                    tokens_out: 0,
                    latency_ms,
                    input_cost_per_1k: None,
                    output_cost_per_1k: None,
                    error_code: Some(e.to_string()),
                    request_id,
                },
            )
            .await;

            error_response(&e)
        }
    }
}

/// Handle `POST /api/ai/{task}/stream`
///
/// Emits SSE-framed think-detection events; the terminal `done` event
/// is sent even when the upstream call fails. Usage is recorded after
/// the event stream is exhausted.
pub async fn invoke_stream(
    State(state): State<AppState>,
    Path(task): Path<String>,
    CallerId(user_id): CallerId,
    OriginalUri(uri): OriginalUri,
    Json(body): Json<TaskRequest>,
) -> Response {
    let endpoint = uri.path().to_owned();
    let request_id = scribe_core::RequestContext::new(user_id, endpoint.clone()).request_id;

    let (call, request_text) = match body.into_call(task.clone(), user_id) {
        Ok(parts) => parts,
        Err(e) => return error_response(&e),
    };

    let start = Instant::now();
    let (model, events) = state.llm().stream_chat_with_think_detection(&call).await;

    struct StreamLog {
        inner: std::pin::Pin<Box<dyn Stream<Item = StreamEvent> + Send>>,
        state: AppState,
        endpoint: String,
        task: String,
        user_id: Option<i64>,
        model: Option<String>,
        request_text: String,
        request_id: String,
        start: Instant,
        response_chars: usize,
        error_code: Option<String>,
    }

    let log = StreamLog {
        inner: events,
        state,
        endpoint,
        task,
        user_id,
        model,
        request_text,
        request_id,
        start,
        response_chars: 0,
        error_code: None,
    };

    let sse_stream = futures_util::stream::unfold(log, |mut log| async move {
        match log.inner.next().await {
            Some(event) => {
                match &event {
                    StreamEvent::Delta { content, .. } => log.response_chars += content.chars().count(),
                    StreamEvent::Error { message, .. } => log.error_code = Some(message.clone()),
                    StreamEvent::Done => {}
                }

                let data = serde_json::to_string(&event).unwrap_or_default();
                Some((Ok::<_, axum::Error>(Event::default().data(data)), log))
            }
            None => {
                let latency_ms = u64::try_from(log.start.elapsed().as_millis()).unwrap_or(u64::MAX);
                record_request(
                    &log.state,
                    RequestParts {
                        endpoint: log.endpoint.clone(),
                        task: &log.task,
                        user_id: log.user_id,
                        model: log.model.clone(),
                        request_chars: log.request_text.chars().count(),
                        response_chars: log.response_chars,
                        tokens_in: estimate_tokens(&log.request_text),
                        tokens_out: log.response_chars / 4,
                        latency_ms,
                        input_cost_per_1k: None,
                        output_cost_per_1k: None,
                        error_code: log.error_code.clone(),
                        request_id: log.request_id.clone(),
                    },
                )
                .await;

                None
            }
        }
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default()).into_response()
}

/// Body of an embedding request
#[derive(Debug, Deserialize)]
pub struct EmbeddingRequestBody {
    pub text: String,
}

/// Response of an embedding request
#[derive(Debug, Serialize)]
pub struct EmbeddingResponseBody {
    pub embedding: Vec<f32>,
}

/// Handle `POST /api/ai/embedding`
pub async fn embedding(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    OriginalUri(uri): OriginalUri,
    Json(body): Json<EmbeddingRequestBody>,
) -> Response {
    let endpoint = uri.path().to_owned();
    let request_id = scribe_core::RequestContext::new(user_id, endpoint.clone()).request_id;

    let start = Instant::now();
    let result = state.llm().embed(&body.text, user_id).await;
    let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let (error_code, response) = match result {
        Ok(vector) => (None, Json(EmbeddingResponseBody { embedding: vector }).into_response()),
        Err(e) => (Some(e.to_string()), error_response(&e)),
    };

    record_request(
        &state,
        RequestParts {
            endpoint,
            task: "embedding",
            user_id,
            model: None,
            request_chars: body.text.chars().count(),
            response_chars: 0,
            tokens_in: estimate_tokens(&body.text),
            tokens_out: 0,
            latency_ms,
            input_cost_per_1k: None,
            output_cost_per_1k: None,
            error_code,
            request_id,
        },
    )
    .await;

    response
}

struct RequestParts<'a> {
    endpoint: String,
    task: &'a str,
    user_id: Option<i64>,
    model: Option<String>,
    request_chars: usize,
    response_chars: usize,
    tokens_in: usize,
    tokens_out: usize,
    latency_ms: u64,
    input_cost_per_1k: Option<f64>,
    output_cost_per_1k: Option<f64>,
    error_code: Option<String>,
    request_id: String,
}

/// Record in-memory metrics and the durable usage row for one request
async fn record_request(state: &AppState, parts: RequestParts<'_>) {
    let success = parts.error_code.is_none();

    #[allow(clippy::cast_precision_loss)]
    state.metrics().record(&RequestMetric {
        endpoint: parts.endpoint.clone(),
        duration_ms: parts.latency_ms as f64,
        success,
        tokens_in: parts.tokens_in as u64,
        tokens_out: parts.tokens_out as u64,
        model: parts.model.clone(),
        cached: false,
    });

    let clamp = |value: usize| i32::try_from(value).unwrap_or(i32::MAX);

    state
        .usage()
        .record(UsageRecord {
            user_id: parts.user_id.map_or_else(|| "anonymous".to_owned(), |id| id.to_string()),
            endpoint: parts.endpoint,
            task_type: Some(parts.task.to_owned()),
            provider_code: None,
            model_id: None,
            model: parts.model,
            request_chars: clamp(parts.request_chars),
            response_chars: clamp(parts.response_chars),
            tokens_in: clamp(parts.tokens_in),
            tokens_out: clamp(parts.tokens_out),
            latency_ms: i32::try_from(parts.latency_ms).unwrap_or(i32::MAX),
            estimated_cost: None,
            input_cost_per_1k: parts.input_cost_per_1k,
            output_cost_per_1k: parts.output_cost_per_1k,
            success,
            cached: false,
            error_code: parts.error_code,
            request_id: Some(parts.request_id),
        })
        .await;
}
