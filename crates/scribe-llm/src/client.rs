//! Opaque remote completion/embedding client
//!
//! The dispatcher treats the upstream LLM call as an external
//! collaborator with a stable request/response contract, expressed here
//! as the [`CompletionClient`] trait. The bundled implementation speaks
//! the OpenAI-compatible wire over reqwest; protocol prefixes
//! (`openai/`, `azure/`) exist for routing and are stripped before the
//! request leaves the process.

use std::pin::Pin;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Default base URL when neither credential nor provider carries one
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// A fully resolved chat call
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model identifier, possibly protocol-prefixed
    pub model: String,
    /// Rendered prompt, sent as a single user message
    pub prompt: String,
    pub api_key: SecretString,
    pub base_url: Option<String>,
    pub temperature: f64,
    pub max_tokens: Option<i32>,
}

/// Token usage reported by the upstream call
#[derive(Debug, Clone, Copy)]
pub struct ChatUsage {
    pub tokens_in: u32,
    pub tokens_out: u32,
}

/// Outcome of a non-streaming chat call
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Option<ChatUsage>,
}

/// A fully resolved embedding call
#[derive(Debug, Clone)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: String,
    pub api_key: SecretString,
    pub base_url: Option<String>,
}

/// Stream of raw text chunks from an upstream completion
pub type ChatChunkStream = Pin<Box<dyn Stream<Item = Result<String, DispatchError>> + Send>>;

/// The remote call contract the dispatcher depends on
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send a non-streaming chat completion
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, DispatchError>;

    /// Send a streaming chat completion
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatChunkStream, DispatchError>;

    /// Generate an embedding vector
    async fn embed(&self, request: &EmbeddingRequest) -> Result<Vec<f32>, DispatchError>;
}

// -- wire types --

#[derive(Serialize)]
struct WireChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct WireChatResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessageBody,
}

#[derive(Deserialize)]
struct WireMessageBody {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct WireStreamChunk {
    choices: Vec<WireStreamChoice>,
}

#[derive(Deserialize)]
struct WireStreamChoice {
    delta: WireDelta,
}

#[derive(Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct WireEmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct WireEmbeddingResponse {
    data: Vec<WireEmbeddingData>,
}

#[derive(Deserialize)]
struct WireEmbeddingData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible HTTP implementation of [`CompletionClient`]
#[derive(Clone, Default)]
pub struct HttpCompletionClient {
    client: Client,
}

impl HttpCompletionClient {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    fn endpoint(base_url: Option<&str>, path: &str) -> String {
        let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        format!("{base}/{path}")
    }

    /// Drop the routing prefix before the identifier goes on the wire
    fn wire_model(model: &str) -> &str {
        model
            .strip_prefix("openai/")
            .or_else(|| model.strip_prefix("azure/"))
            .unwrap_or(model)
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, DispatchError> {
        let wire_request = WireChatRequest {
            model: Self::wire_model(&request.model),
            messages: vec![WireMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: None,
        };

        let response = self
            .client
            .post(Self::endpoint(request.base_url.as_deref(), "chat/completions"))
            .bearer_auth(request.api_key.expose_secret())
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(model = %request.model, error = %e, "upstream request failed");
                DispatchError::Upstream(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(model = %request.model, status = %status, "upstream returned error");
            return Err(DispatchError::Upstream(format!("provider returned {status}: {body}")));
        }

        let wire_response: WireChatResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::Upstream(format!("failed to parse response: {e}")))?;

        let content = wire_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        let usage = wire_response.usage.map(|usage| ChatUsage {
            tokens_in: usage.prompt_tokens,
            tokens_out: usage.completion_tokens,
        });

        Ok(ChatResponse { content, usage })
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatChunkStream, DispatchError> {
        let wire_request = WireChatRequest {
            model: Self::wire_model(&request.model),
            messages: vec![WireMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: Some(true),
        };

        let response = self
            .client
            .post(Self::endpoint(request.base_url.as_deref(), "chat/completions"))
            .bearer_auth(request.api_key.expose_secret())
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(model = %request.model, error = %e, "upstream stream request failed");
                DispatchError::Upstream(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Upstream(format!("provider returned {status}: {body}")));
        }

        let mapped = response
            .bytes_stream()
            .eventsource()
            .map(|result| match result {
                Ok(event) => {
                    let data = event.data.trim().to_owned();
                    if data == "[DONE]" {
                        return vec![];
                    }

                    match serde_json::from_str::<WireStreamChunk>(&data) {
                        Ok(chunk) => chunk
                            .choices
                            .into_iter()
                            .filter_map(|choice| choice.delta.content)
                            .filter(|content| !content.is_empty())
                            .map(Ok)
                            .collect(),
                        Err(e) => {
                            tracing::debug!(error = %e, data = %data, "skipping unparseable SSE chunk");
                            vec![]
                        }
                    }
                }
                Err(e) => vec![Err(DispatchError::Streaming(e.to_string()))],
            })
            .flat_map(futures_util::stream::iter);

        Ok(Box::pin(mapped))
    }

    async fn embed(&self, request: &EmbeddingRequest) -> Result<Vec<f32>, DispatchError> {
        let wire_request = WireEmbeddingRequest {
            model: Self::wire_model(&request.model),
            input: vec![&request.input],
        };

        let response = self
            .client
            .post(Self::endpoint(request.base_url.as_deref(), "embeddings"))
            .bearer_auth(request.api_key.expose_secret())
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(model = %request.model, error = %e, "upstream embedding request failed");
                DispatchError::Upstream(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Upstream(format!("provider returned {status}: {body}")));
        }

        let wire_response: WireEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::Upstream(format!("failed to parse response: {e}")))?;

        wire_response
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .ok_or_else(|| DispatchError::Upstream("embedding response contained no data".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn chat_request(base_url: &str, model: &str) -> ChatRequest {
        ChatRequest {
            model: model.to_owned(),
            prompt: "Summarize this".to_owned(),
            api_key: SecretString::from("sk-test"),
            base_url: Some(base_url.to_owned()),
            temperature: 0.7,
            max_tokens: Some(256),
        }
    }

    #[test]
    fn wire_model_strips_routing_prefixes() {
        assert_eq!(HttpCompletionClient::wire_model("openai/gpt-4o"), "gpt-4o");
        assert_eq!(HttpCompletionClient::wire_model("azure/gpt-4o"), "gpt-4o");
        assert_eq!(HttpCompletionClient::wire_model("claude-sonnet-4"), "claude-sonnet-4");
    }

    #[tokio::test]
    async fn chat_parses_content_and_usage() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({ "model": "gpt-4o-mini" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "A summary." } }],
                "usage": { "prompt_tokens": 12, "completion_tokens": 4 }
            })))
            .mount(&server)
            .await;

        let client = HttpCompletionClient::new();
        let base = format!("{}/v1", server.uri());
        let response = client
            .chat(&chat_request(&base, "openai/gpt-4o-mini"))
            .await
            .unwrap();

        assert_eq!(response.content, "A summary.");
        let usage = response.usage.unwrap();
        assert_eq!(usage.tokens_in, 12);
        assert_eq!(usage.tokens_out, 4);
    }

    #[tokio::test]
    async fn chat_surfaces_upstream_error_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = HttpCompletionClient::new();
        let base = format!("{}/v1", server.uri());
        let err = client.chat(&chat_request(&base, "gpt-4o-mini")).await.unwrap_err();

        assert!(matches!(err, DispatchError::Upstream(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn chat_stream_collects_deltas_until_done() {
        let server = MockServer::start().await;

        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let client = HttpCompletionClient::new();
        let base = format!("{}/v1", server.uri());
        let stream = client
            .chat_stream(&chat_request(&base, "gpt-4o-mini"))
            .await
            .unwrap();

        let chunks: Vec<String> = stream.map(Result::unwrap).collect().await;
        assert_eq!(chunks.concat(), "Hello");
    }

    #[tokio::test]
    async fn embed_returns_first_vector() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "embedding": [0.25, -0.5, 0.125] }]
            })))
            .mount(&server)
            .await;

        let client = HttpCompletionClient::new();
        let base = format!("{}/v1", server.uri());
        let vector = client
            .embed(&EmbeddingRequest {
                model: "text-embedding-3-small".to_owned(),
                input: "hello".to_owned(),
                api_key: SecretString::from("sk-test"),
                base_url: Some(base),
            })
            .await
            .unwrap();

        assert_eq!(vector, vec![0.25, -0.5, 0.125]);
    }
}
