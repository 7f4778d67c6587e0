use std::collections::HashMap;

use scribe_core::ApiType;
use secrecy::SecretString;
use serde::Deserialize;

/// Environment-sourced model routing fallbacks
///
/// Used when the routing table has no row for a task: `task_models`
/// maps a task alias to the model identifier to call, and
/// `env_credentials` supplies API keys for providers that should work
/// without any database-stored credential.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider code whose env credential backs requests that resolve
    /// no routing row at all
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Task alias to model identifier fallbacks
    #[serde(default)]
    pub task_models: HashMap<String, String>,
    /// Environment credentials keyed by provider code
    #[serde(default)]
    pub env_credentials: HashMap<String, EnvCredentialConfig>,
}

/// A credential sourced from configuration rather than the database
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvCredentialConfig {
    /// Provider protocol family
    pub api_type: ApiType,
    /// API key, usually `{{ env.SOME_API_KEY | default("") }}`
    pub api_key: SecretString,
    /// Base URL for the provider's API
    #[serde(default)]
    pub base_url: Option<String>,
}

impl LlmConfig {
    /// Resolve a task alias to its configured fallback model
    ///
    /// Unknown aliases pass through unchanged, matching the behavior of
    /// callers that supply a literal model name where an alias is
    /// expected.
    pub fn fallback_model<'a>(&'a self, alias: &'a str) -> &'a str {
        self.task_models.get(alias).map_or(alias, String::as_str)
    }
}
