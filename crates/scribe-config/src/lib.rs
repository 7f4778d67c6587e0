//! Configuration for the Scribe AI service
//!
//! TOML files with `{{ env.VAR }}` interpolation, deserialized into
//! plain structs and validated before the service starts.

#![allow(clippy::must_use_candidate)]

pub mod database;
mod env;
pub mod llm;
mod loader;
pub mod server;
pub mod usage;

use serde::Deserialize;

pub use database::DatabaseConfig;
pub use llm::{EnvCredentialConfig, LlmConfig};
pub use server::ServerConfig;
pub use usage::UsageConfig;

/// Top-level Scribe configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Relational store configuration
    pub database: DatabaseConfig,
    /// Shared-secret configuration
    pub auth: AuthConfig,
    /// Model routing fallbacks sourced from the environment
    #[serde(default)]
    pub llm: LlmConfig,
    /// Usage logging and alerting configuration
    #[serde(default)]
    pub usage: UsageConfig,
}

/// Shared-secret configuration
///
/// The platform signs access tokens with this secret; the credential
/// store reuses it to derive the at-rest encryption key, so it must
/// match the token-signing secret configured on the gateway.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Shared secret, usually `{{ env.SCRIBE_SHARED_SECRET }}`
    pub shared_secret: secrecy::SecretString,
}
