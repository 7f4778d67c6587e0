//! Credential storage and resolution
//!
//! API keys are stored encrypted (see [`crate::crypto`]) and resolved
//! through a fixed precedence: explicit credential id, the caller's own
//! credentials (default first), a system credential, and finally an
//! environment-configured credential for known provider codes. Base
//! URLs handed out by this module are always normalized.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use scribe_core::ApiType;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;

use crate::crypto::{self, KeyCipher};
use crate::error::CatalogError;
use crate::urls::normalize_api_base;

/// A credential sourced from configuration rather than the database
#[derive(Debug, Clone)]
pub struct EnvCredential {
    pub api_type: ApiType,
    pub api_key: SecretString,
    pub base_url: Option<String>,
}

/// A resolved, decrypted credential ready for dispatch
///
/// `id` and `provider_id` are zero when the credential came from the
/// environment table instead of the database.
#[derive(Debug, Clone)]
pub struct CredentialInfo {
    pub id: i64,
    pub provider_id: i64,
    pub provider_code: String,
    pub api_type: Option<ApiType>,
    pub api_key: SecretString,
    pub base_url: Option<String>,
    pub extra_config: Value,
    pub is_default: bool,
}

/// Fields for storing a new credential
#[derive(Debug, Clone, Deserialize)]
pub struct SaveCredential {
    pub provider_code: String,
    pub api_key: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub base_url_override: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub extra_config: Option<Value>,
}

/// A credential as listed to its owner: hint only, never the secret
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CredentialSummary {
    pub id: i64,
    pub name: Option<String>,
    pub api_key_hint: String,
    pub provider_code: String,
    pub provider_name: Option<String>,
    pub base_url_override: Option<String>,
    pub extra_config: Value,
    pub is_default: bool,
    pub is_enabled: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: i64,
    provider_id: i64,
    provider_code: String,
    api_type: String,
    api_key_encrypted: String,
    base_url: Option<String>,
    extra_config: Value,
    is_default: bool,
}

const CREDENTIAL_COLUMNS: &str = "c.id, c.provider_id, p.code AS provider_code, p.api_type, \
     c.api_key_encrypted, COALESCE(c.base_url_override, p.base_url) AS base_url, \
     c.extra_config, c.is_default";

/// Service for storing and resolving AI API credentials
pub struct CredentialResolver {
    pool: PgPool,
    cipher: KeyCipher,
    env_credentials: HashMap<String, EnvCredential>,
}

impl CredentialResolver {
    /// Create a resolver
    ///
    /// `shared_secret` is the platform's token-signing secret;
    /// `env_credentials` is the provider-code-keyed fallback table from
    /// configuration.
    pub fn new(
        pool: PgPool,
        shared_secret: &str,
        env_credentials: HashMap<String, EnvCredential>,
    ) -> Self {
        Self {
            pool,
            cipher: KeyCipher::from_shared_secret(shared_secret),
            env_credentials,
        }
    }

    /// Encrypt an API key for storage
    pub fn encrypt_api_key(&self, api_key: &str) -> Result<String, CatalogError> {
        self.cipher.encrypt(api_key)
    }

    /// Decrypt an API key from storage
    pub fn decrypt_api_key(&self, encrypted: &str) -> Result<String, CatalogError> {
        self.cipher.decrypt(encrypted)
    }

    /// Build the display hint for an API key
    pub fn generate_hint(api_key: &str) -> String {
        crypto::generate_hint(api_key)
    }

    /// Store a credential, returning its id
    ///
    /// Marking the credential as default clears the default flag on all
    /// other credentials owned by the same (user, provider) pair within
    /// the same transaction.
    pub async fn save_credential(&self, save: SaveCredential) -> Result<i64, CatalogError> {
        let encrypted = self.cipher.encrypt(&save.api_key)?;
        let hint = crypto::generate_hint(&save.api_key);
        let extra_config = save.extra_config.unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        let mut tx = self.pool.begin().await?;

        if save.is_default {
            sqlx::query(
                "UPDATE ai_credentials SET is_default = FALSE \
                 WHERE user_id IS NOT DISTINCT FROM $1 \
                   AND provider_id = (SELECT id FROM ai_providers WHERE code = $2)",
            )
            .bind(save.user_id)
            .bind(&save.provider_code)
            .execute(&mut *tx)
            .await?;
        }

        let id: Option<i64> = sqlx::query_scalar(
            "INSERT INTO ai_credentials \
                 (user_id, provider_id, name, api_key_encrypted, api_key_hint, \
                  base_url_override, is_default, extra_config) \
             SELECT $1, p.id, $2, $3, $4, $5, $6, $7 \
             FROM ai_providers p WHERE p.code = $8 \
             RETURNING id",
        )
        .bind(save.user_id)
        .bind(&save.name)
        .bind(&encrypted)
        .bind(&hint)
        .bind(&save.base_url_override)
        .bind(save.is_default)
        .bind(&extra_config)
        .bind(&save.provider_code)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = id else {
            return Err(CatalogError::ProviderNotFound {
                code: save.provider_code,
            });
        };

        tx.commit().await?;
        Ok(id)
    }

    /// Resolve a credential for a provider
    ///
    /// Precedence: the exact `credential_id` if supplied and visible to
    /// the caller; the caller's own credentials for the provider,
    /// default first; a system (null-user) credential; the
    /// environment-configured credential table. `None` when no tier
    /// matches.
    pub async fn get_credential(
        &self,
        provider_code: &str,
        user_id: Option<i64>,
        credential_id: Option<i64>,
    ) -> Result<Option<CredentialInfo>, CatalogError> {
        let row: Option<CredentialRow> = if let Some(credential_id) = credential_id {
            let query = format!(
                "SELECT {CREDENTIAL_COLUMNS} \
                 FROM ai_credentials c JOIN ai_providers p ON c.provider_id = p.id \
                 WHERE c.id = $1 \
                   AND c.is_enabled = TRUE \
                   AND (c.user_id IS NOT DISTINCT FROM $2 OR c.user_id IS NULL)"
            );
            sqlx::query_as(&query)
                .bind(credential_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?
        } else {
            let query = format!(
                "SELECT {CREDENTIAL_COLUMNS} \
                 FROM ai_credentials c JOIN ai_providers p ON c.provider_id = p.id \
                 WHERE p.code = $1 \
                   AND (c.user_id = $2 OR c.user_id IS NULL) \
                   AND c.is_enabled = TRUE \
                 ORDER BY c.user_id NULLS LAST, c.is_default DESC \
                 LIMIT 1"
            );
            sqlx::query_as(&query)
                .bind(provider_code)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?
        };

        if let Some(row) = row {
            return Ok(Some(self.decrypt_row(row)?));
        }

        Ok(self.env_credential(provider_code))
    }

    /// Resolve a credential from the environment table
    fn env_credential(&self, provider_code: &str) -> Option<CredentialInfo> {
        let env = self.env_credentials.get(provider_code)?;

        Some(CredentialInfo {
            id: 0,
            provider_id: 0,
            provider_code: provider_code.to_owned(),
            api_type: Some(env.api_type),
            api_key: env.api_key.clone(),
            base_url: normalize_api_base(env.base_url.as_deref(), Some(env.api_type), None),
            extra_config: Value::Object(serde_json::Map::new()),
            is_default: true,
        })
    }

    fn decrypt_row(&self, row: CredentialRow) -> Result<CredentialInfo, CatalogError> {
        let api_type = ApiType::parse(&row.api_type);
        let api_key = self.cipher.decrypt(&row.api_key_encrypted)?;
        let base_url = normalize_api_base(row.base_url.as_deref(), api_type, Some(&row.extra_config));

        Ok(CredentialInfo {
            id: row.id,
            provider_id: row.provider_id,
            provider_code: row.provider_code,
            api_type,
            api_key: SecretString::from(api_key),
            base_url,
            extra_config: row.extra_config,
            is_default: row.is_default,
        })
    }

    /// List a user's credentials (hints only, secrets stay encrypted)
    pub async fn list_credentials(&self, user_id: Option<i64>) -> Result<Vec<CredentialSummary>, CatalogError> {
        let credentials = sqlx::query_as(
            "SELECT c.id, c.name, c.api_key_hint, p.code AS provider_code, \
                    p.display_name AS provider_name, c.base_url_override, c.extra_config, \
                    c.is_default, c.is_enabled, c.last_used_at, c.last_error, c.created_at \
             FROM ai_credentials c JOIN ai_providers p ON c.provider_id = p.id \
             WHERE c.user_id IS NOT DISTINCT FROM $1 \
             ORDER BY c.is_default DESC, c.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(credentials)
    }

    /// Delete a credential owned by the given scope
    pub async fn delete_credential(&self, credential_id: i64, user_id: Option<i64>) -> Result<bool, CatalogError> {
        let deleted: Option<i64> = sqlx::query_scalar(
            "DELETE FROM ai_credentials \
             WHERE id = $1 AND user_id IS NOT DISTINCT FROM $2 \
             RETURNING id",
        )
        .bind(credential_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(deleted.is_some())
    }

    /// Stamp a credential with its most recent use and outcome
    pub async fn update_last_used(&self, credential_id: i64, error: Option<&str>) -> Result<(), CatalogError> {
        sqlx::query("UPDATE ai_credentials SET last_used_at = $1, last_error = $2 WHERE id = $3")
            .bind(Utc::now())
            .bind(error)
            .bind(credential_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
