//! Route resolution and dispatch
//!
//! A call resolves through three tiers, evaluated once and reused for
//! any retry: an explicit model override (whose failures are
//! caller-visible), the database routing table, and finally the
//! environment fallback configuration. A fallback model configured via
//! routing is retried exactly once; an override never falls back.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::Stream;
use scribe_catalog::ModelRecord;
use scribe_config::LlmConfig;
use scribe_core::ApiType;
use scribe_routing::ModelRouter;
use secrecy::SecretString;

use crate::client::{ChatChunkStream, ChatRequest, CompletionClient, EmbeddingRequest};
use crate::error::DispatchError;
use crate::prompt::render_prompt;
use crate::think::{self, StreamEvent};

/// Temperature used when no routing or task default applies
const OVERRIDE_TEMPERATURE: f64 = 0.7;

/// One task invocation as received from the endpoint layer
#[derive(Debug, Clone, Default)]
pub struct TaskCall {
    /// Named prompt variables; `content` doubles as the template when
    /// none is configured
    pub variables: BTreeMap<String, String>,
    /// Logical task alias, e.g. `summary`
    pub task_alias: String,
    /// Authenticated caller
    pub user_id: Option<i64>,
    /// Caller-supplied prompt template override
    pub custom_prompt: Option<String>,
    /// Explicit model override; failures here are caller-visible
    pub model_id: Option<String>,
    /// Provider scope for the explicit override
    pub provider_code: Option<String>,
}

/// Result of a non-streaming chat dispatch
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub content: String,
    /// Model string the call was dispatched with (protocol-prefixed)
    pub model: String,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
    /// Per-1k costs of the dispatched model, for usage pricing
    pub input_cost_per_1k: Option<f64>,
    pub output_cost_per_1k: Option<f64>,
}

/// A resolved route, ready to dispatch
#[derive(Debug, Clone)]
struct ResolvedRoute {
    model: String,
    api_key: SecretString,
    base_url: Option<String>,
    temperature: f64,
    max_tokens: Option<i32>,
    prompt_template: Option<String>,
    /// Database credential id for last-used stamping; `None` for
    /// environment credentials
    credential_id: Option<i64>,
    /// Per-1k costs of the resolved model, when known
    input_cost_per_1k: Option<f64>,
    output_cost_per_1k: Option<f64>,
    /// Routing-configured fallback; never populated for overrides
    fallback_model: Option<ModelRecord>,
}

/// Dispatch router over the routing table and environment fallbacks
pub struct LlmRouter {
    router: Arc<ModelRouter>,
    client: Arc<dyn CompletionClient>,
    env: LlmConfig,
}

impl LlmRouter {
    pub fn new(router: Arc<ModelRouter>, client: Arc<dyn CompletionClient>, env: LlmConfig) -> Self {
        Self { router, client, env }
    }

    /// Resolve which model string a call would be dispatched with
    pub async fn resolve_effective_model(&self, call: &TaskCall) -> Result<String, DispatchError> {
        let route = self.resolve_route(call).await?;
        Ok(route.model)
    }

    /// Send a chat completion, retrying once on a routed fallback model
    pub async fn chat(&self, call: &TaskCall) -> Result<ChatOutcome, DispatchError> {
        let route = self.resolve_route(call).await?;
        let prompt = self.render(call, &route);

        let request = build_request(&route, &prompt);
        let primary = self.client.chat(&request).await;

        self.stamp_credential(&route, primary.as_ref().err()).await;

        match primary {
            Ok(response) => Ok(ChatOutcome {
                content: response.content,
                model: route.model,
                tokens_in: response.usage.map(|u| u.tokens_in),
                tokens_out: response.usage.map(|u| u.tokens_out),
                input_cost_per_1k: route.input_cost_per_1k,
                output_cost_per_1k: route.output_cost_per_1k,
            }),
            Err(primary_err) => {
                let Some(fallback) = self.resolve_fallback(&route, &primary_err).await? else {
                    return Err(primary_err);
                };

                let request = build_request(&fallback, &prompt);
                let response = self.client.chat(&request).await?;

                Ok(ChatOutcome {
                    content: response.content,
                    model: fallback.model,
                    tokens_in: response.usage.map(|u| u.tokens_in),
                    tokens_out: response.usage.map(|u| u.tokens_out),
                    input_cost_per_1k: fallback.input_cost_per_1k,
                    output_cost_per_1k: fallback.output_cost_per_1k,
                })
            }
        }
    }

    /// Open a streaming chat completion
    ///
    /// Fallback applies to stream initiation only; once chunks are
    /// flowing, errors propagate through the stream.
    pub async fn stream_chat(&self, call: &TaskCall) -> Result<(String, ChatChunkStream), DispatchError> {
        let route = self.resolve_route(call).await?;
        let prompt = self.render(call, &route);

        let request = build_request(&route, &prompt);
        let primary = self.client.chat_stream(&request).await;

        self.stamp_credential(&route, primary.as_ref().err()).await;

        match primary {
            Ok(stream) => Ok((route.model, stream)),
            Err(primary_err) => {
                let Some(fallback) = self.resolve_fallback(&route, &primary_err).await? else {
                    return Err(primary_err);
                };

                let request = build_request(&fallback, &prompt);
                let stream = self.client.chat_stream(&request).await?;
                Ok((fallback.model, stream))
            }
        }
    }

    /// Stream a chat completion with `<think>` block detection
    ///
    /// The returned sequence always terminates with a `done` event; a
    /// resolution or upstream failure yields an `error` event first.
    pub async fn stream_chat_with_think_detection(
        &self,
        call: &TaskCall,
    ) -> (Option<String>, Pin<Box<dyn Stream<Item = StreamEvent> + Send>>) {
        match self.stream_chat(call).await {
            Ok((model, stream)) => (Some(model), think::detect_think_stream(stream)),
            Err(e) => {
                let events = [StreamEvent::error(e.to_string()), StreamEvent::Done];
                (None, Box::pin(futures_util::stream::iter(events)))
            }
        }
    }

    /// Generate an embedding for a text
    pub async fn embed(&self, text: &str, user_id: Option<i64>) -> Result<Vec<f32>, DispatchError> {
        let routing = match self.router.resolve_routing("embedding", user_id).await {
            Ok(routing) => routing,
            Err(e) => {
                tracing::warn!(error = %e, "failed to get embedding routing, using env config");
                None
            }
        };

        let (model, api_key, base_url) = if let Some(route) = routing {
            (
                route.model.model_id,
                route.credential.api_key,
                route.credential.base_url,
            )
        } else {
            let credential = self.env_default_credential(user_id).await?;
            (
                self.env.fallback_model("embedding").to_owned(),
                credential.api_key,
                credential.base_url,
            )
        };

        self.client
            .embed(&EmbeddingRequest {
                model,
                input: text.to_owned(),
                api_key,
                base_url,
            })
            .await
    }

    /// Resolve a call to a dispatchable route
    ///
    /// Tier order: explicit override, routing table, environment
    /// fallback. Routing-table lookup failures degrade to the
    /// environment tier; override failures never do.
    async fn resolve_route(&self, call: &TaskCall) -> Result<ResolvedRoute, DispatchError> {
        if let Some(route) = self.resolve_override(call).await? {
            return Ok(route);
        }

        let routing = match self.router.resolve_routing(&call.task_alias, call.user_id).await {
            Ok(routing) => routing,
            Err(e) => {
                tracing::warn!(
                    task = %call.task_alias,
                    error = %e,
                    "failed to get routing from database, using env config"
                );
                None
            }
        };

        if let Some(route) = routing {
            let model = prefix_model(&route.model.model_id, route.credential.api_type);
            return Ok(ResolvedRoute {
                model,
                api_key: route.credential.api_key,
                base_url: route.credential.base_url,
                temperature: route.temperature,
                max_tokens: route.max_tokens,
                prompt_template: route.prompt_template,
                credential_id: (route.credential.id > 0).then_some(route.credential.id),
                input_cost_per_1k: route.model.input_cost_per_1k,
                output_cost_per_1k: route.model.output_cost_per_1k,
                fallback_model: route.fallback_model,
            });
        }

        let credential = self.env_default_credential(call.user_id).await?;
        let model = prefix_model(self.env.fallback_model(&call.task_alias), credential.api_type);

        Ok(ResolvedRoute {
            model,
            api_key: credential.api_key,
            base_url: credential.base_url,
            temperature: OVERRIDE_TEMPERATURE,
            max_tokens: None,
            prompt_template: None,
            credential_id: (credential.id > 0).then_some(credential.id),
            input_cost_per_1k: None,
            output_cost_per_1k: None,
            fallback_model: None,
        })
    }

    /// Resolve an explicit model override, if one was supplied
    ///
    /// Unlike the routing tiers, failures here are surfaced: a caller
    /// who names a model is told when it does not exist.
    async fn resolve_override(&self, call: &TaskCall) -> Result<Option<ResolvedRoute>, DispatchError> {
        let Some(model_id) = &call.model_id else {
            return Ok(None);
        };

        let model = self
            .router
            .registry()
            .get_model(model_id, call.provider_code.as_deref())
            .await?
            .ok_or_else(|| DispatchError::ModelNotFound {
                model: model_id.clone(),
            })?;

        let credential = self
            .router
            .credentials()
            .get_credential(&model.provider_code, call.user_id, None)
            .await?
            .ok_or_else(|| DispatchError::CredentialNotFound {
                provider: model.provider_code.clone(),
            })?;

        Ok(Some(ResolvedRoute {
            model: prefix_model(&model.model_id, credential.api_type),
            api_key: credential.api_key,
            base_url: credential.base_url,
            temperature: OVERRIDE_TEMPERATURE,
            max_tokens: None,
            prompt_template: None,
            credential_id: (credential.id > 0).then_some(credential.id),
            input_cost_per_1k: model.input_cost_per_1k,
            output_cost_per_1k: model.output_cost_per_1k,
            fallback_model: None,
        }))
    }

    /// Resolve the fallback route after a failed primary attempt
    ///
    /// Returns `None` when the route carries no fallback model or no
    /// credential can be found for the fallback provider; the caller
    /// then propagates the primary error unmodified.
    async fn resolve_fallback(
        &self,
        route: &ResolvedRoute,
        primary_err: &DispatchError,
    ) -> Result<Option<ResolvedRoute>, DispatchError> {
        let Some(fallback_model) = &route.fallback_model else {
            return Ok(None);
        };

        tracing::warn!(
            fallback = %fallback_model.model_id,
            error = %primary_err,
            "primary model failed, trying fallback"
        );

        let Some(credential) = self
            .router
            .credentials()
            .get_credential(&fallback_model.provider_code, None, None)
            .await?
        else {
            tracing::warn!(
                provider = %fallback_model.provider_code,
                "no credential for fallback provider"
            );
            return Ok(None);
        };

        Ok(Some(ResolvedRoute {
            model: prefix_model(&fallback_model.model_id, credential.api_type),
            api_key: credential.api_key,
            base_url: credential.base_url,
            temperature: route.temperature,
            max_tokens: route.max_tokens,
            prompt_template: route.prompt_template.clone(),
            credential_id: (credential.id > 0).then_some(credential.id),
            input_cost_per_1k: fallback_model.input_cost_per_1k,
            output_cost_per_1k: fallback_model.output_cost_per_1k,
            fallback_model: None,
        }))
    }

    /// Resolve the environment default credential
    async fn env_default_credential(
        &self,
        user_id: Option<i64>,
    ) -> Result<scribe_catalog::CredentialInfo, DispatchError> {
        let Some(provider_code) = &self.env.default_provider else {
            return Err(DispatchError::CredentialNotFound {
                provider: "default".to_owned(),
            });
        };

        self.router
            .credentials()
            .get_credential(provider_code, user_id, None)
            .await?
            .ok_or_else(|| DispatchError::CredentialNotFound {
                provider: provider_code.clone(),
            })
    }

    fn render(&self, call: &TaskCall, route: &ResolvedRoute) -> String {
        let template = call
            .custom_prompt
            .as_deref()
            .or(route.prompt_template.as_deref());
        render_prompt(template, &call.variables)
    }

    /// Stamp a database credential with its latest use and outcome
    ///
    /// Bookkeeping only: a failed stamp is logged and never surfaced.
    async fn stamp_credential(&self, route: &ResolvedRoute, error: Option<&DispatchError>) {
        let Some(credential_id) = route.credential_id else {
            return;
        };

        let message = error.map(ToString::to_string);
        if let Err(e) = self
            .router
            .credentials()
            .update_last_used(credential_id, message.as_deref())
            .await
        {
            tracing::warn!(credential_id, error = %e, "failed to stamp credential last use");
        }
    }
}

fn build_request(route: &ResolvedRoute, prompt: &str) -> ChatRequest {
    ChatRequest {
        model: route.model.clone(),
        prompt: prompt.to_owned(),
        api_key: route.api_key.clone(),
        base_url: route.base_url.clone(),
        temperature: route.temperature,
        max_tokens: route.max_tokens,
    }
}

/// Rewrite a model identifier with the protocol prefix the upstream
/// call layer routes on
///
/// OpenAI-compatible and custom endpoints get `openai/`, Azure gets
/// `azure/`; Anthropic and Google identifiers route natively and stay
/// unprefixed. Idempotent.
fn prefix_model(model_id: &str, api_type: Option<ApiType>) -> String {
    match api_type {
        Some(ApiType::OpenaiCompat | ApiType::Custom) => {
            if model_id.starts_with("openai/") {
                model_id.to_owned()
            } else {
                format!("openai/{model_id}")
            }
        }
        Some(ApiType::Azure) => {
            if model_id.starts_with("azure/") {
                model_id.to_owned()
            } else {
                format!("azure/{model_id}")
            }
        }
        Some(ApiType::Anthropic | ApiType::Google) | None => model_id.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_compat_and_custom_get_openai_prefix() {
        assert_eq!(
            prefix_model("deepseek-chat", Some(ApiType::OpenaiCompat)),
            "openai/deepseek-chat"
        );
        assert_eq!(prefix_model("local-llm", Some(ApiType::Custom)), "openai/local-llm");
    }

    #[test]
    fn azure_gets_azure_prefix() {
        assert_eq!(prefix_model("gpt-4o", Some(ApiType::Azure)), "azure/gpt-4o");
    }

    #[test]
    fn prefixing_is_idempotent() {
        assert_eq!(
            prefix_model("openai/deepseek-chat", Some(ApiType::OpenaiCompat)),
            "openai/deepseek-chat"
        );
        assert_eq!(prefix_model("azure/gpt-4o", Some(ApiType::Azure)), "azure/gpt-4o");
    }

    #[test]
    fn native_protocols_stay_unprefixed() {
        assert_eq!(
            prefix_model("claude-sonnet-4-20250514", Some(ApiType::Anthropic)),
            "claude-sonnet-4-20250514"
        );
        assert_eq!(prefix_model("gemini-2.0-flash", Some(ApiType::Google)), "gemini-2.0-flash");
        assert_eq!(prefix_model("unknown-model", None), "unknown-model");
    }
}
