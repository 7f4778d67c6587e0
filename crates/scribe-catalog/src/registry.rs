//! Provider and model registry
//!
//! CRUD and lookup over provider/model definitions. Lookups by code are
//! served from in-memory caches guarded by mutexes; any successful
//! mutation clears both caches wholesale rather than evicting
//! selectively.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::error::CatalogError;

const PROVIDER_COLUMNS: &str = "id, code, name, display_name, api_type, base_url, doc_url, icon, \
     is_enabled, priority, capabilities, config_schema";

const MODEL_COLUMNS: &str = "m.id, m.provider_id, p.code AS provider_code, m.model_id, \
     m.display_name, m.model_type, m.context_window, m.max_output_tokens, \
     m.input_cost_per_1k, m.output_cost_per_1k, m.capabilities, m.is_enabled";

/// A provider row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProviderRecord {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub display_name: Option<String>,
    pub api_type: String,
    pub base_url: Option<String>,
    pub doc_url: Option<String>,
    pub icon: Option<String>,
    pub is_enabled: bool,
    pub priority: i32,
    pub capabilities: Value,
    pub config_schema: Option<Value>,
}

impl ProviderRecord {
    /// Parsed protocol family, `None` when the stored string is unknown
    pub fn protocol(&self) -> Option<scribe_core::ApiType> {
        scribe_core::ApiType::parse(&self.api_type)
    }
}

/// A model row joined with its provider code
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ModelRecord {
    pub id: i64,
    pub provider_id: i64,
    pub provider_code: String,
    pub model_id: String,
    pub display_name: Option<String>,
    pub model_type: String,
    pub context_window: Option<i32>,
    pub max_output_tokens: Option<i32>,
    pub input_cost_per_1k: Option<f64>,
    pub output_cost_per_1k: Option<f64>,
    pub capabilities: Value,
    pub is_enabled: bool,
}

/// Fields for creating a provider
#[derive(Debug, Clone, Deserialize)]
pub struct NewProvider {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub api_type: scribe_core::ApiType,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub doc_url: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "empty_map")]
    pub capabilities: Value,
    #[serde(default)]
    pub config_schema: Option<Value>,
}

/// Fields for creating a model under a provider
#[derive(Debug, Clone, Deserialize)]
pub struct NewModel {
    pub provider_code: String,
    pub model_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_model_type")]
    pub model_type: String,
    #[serde(default)]
    pub context_window: Option<i32>,
    #[serde(default)]
    pub max_output_tokens: Option<i32>,
    #[serde(default)]
    pub input_cost_per_1k: Option<f64>,
    #[serde(default)]
    pub output_cost_per_1k: Option<f64>,
    #[serde(default = "empty_map")]
    pub capabilities: Value,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

/// Partial update for a provider; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub api_type: Option<scribe_core::ApiType>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub doc_url: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub is_enabled: Option<bool>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub capabilities: Option<Value>,
    #[serde(default)]
    pub config_schema: Option<Value>,
}

impl ProviderPatch {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.display_name.is_none()
            && self.api_type.is_none()
            && self.base_url.is_none()
            && self.doc_url.is_none()
            && self.icon.is_none()
            && self.is_enabled.is_none()
            && self.priority.is_none()
            && self.capabilities.is_none()
            && self.config_schema.is_none()
    }
}

/// Partial update for a model; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelPatch {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub context_window: Option<i32>,
    #[serde(default)]
    pub max_output_tokens: Option<i32>,
    #[serde(default)]
    pub input_cost_per_1k: Option<f64>,
    #[serde(default)]
    pub output_cost_per_1k: Option<f64>,
    #[serde(default)]
    pub capabilities: Option<Value>,
    #[serde(default)]
    pub is_enabled: Option<bool>,
}

impl ModelPatch {
    fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.model_type.is_none()
            && self.context_window.is_none()
            && self.max_output_tokens.is_none()
            && self.input_cost_per_1k.is_none()
            && self.output_cost_per_1k.is_none()
            && self.capabilities.is_none()
            && self.is_enabled.is_none()
    }
}

/// A sort-order assignment for one model
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSortUpdate {
    pub id: i64,
    pub sort: i64,
}

/// Filters for listing models
#[derive(Debug, Clone, Default)]
pub struct ModelFilter<'a> {
    pub provider_code: Option<&'a str>,
    pub model_type: Option<&'a str>,
    pub enabled_only: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_model_type() -> String {
    "chat".to_owned()
}

fn empty_map() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Registry over providers and models with code-keyed lookup caches
pub struct ProviderRegistry {
    pool: PgPool,
    provider_cache: Mutex<HashMap<String, ProviderRecord>>,
    model_cache: Mutex<HashMap<String, ModelRecord>>,
}

impl ProviderRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            provider_cache: Mutex::new(HashMap::new()),
            model_cache: Mutex::new(HashMap::new()),
        }
    }

    /// List providers, most-preferred first
    pub async fn list_providers(&self, enabled_only: bool) -> Result<Vec<ProviderRecord>, CatalogError> {
        let query = format!(
            "SELECT {PROVIDER_COLUMNS} FROM ai_providers \
             WHERE ($1 = FALSE OR is_enabled = TRUE) \
             ORDER BY priority DESC"
        );

        let providers = sqlx::query_as(&query)
            .bind(enabled_only)
            .fetch_all(&self.pool)
            .await?;

        Ok(providers)
    }

    /// Get a provider by code, served from cache when possible
    pub async fn get_provider(&self, code: &str) -> Result<Option<ProviderRecord>, CatalogError> {
        if let Some(provider) = self.lock_providers().get(code) {
            return Ok(Some(provider.clone()));
        }

        let query = format!("SELECT {PROVIDER_COLUMNS} FROM ai_providers WHERE code = $1");
        let provider: Option<ProviderRecord> =
            sqlx::query_as(&query).bind(code).fetch_optional(&self.pool).await?;

        if let Some(provider) = &provider {
            self.lock_providers().insert(code.to_owned(), provider.clone());
        }

        Ok(provider)
    }

    /// Get a provider by database id (uncached; used by admin paths)
    pub async fn get_provider_by_id(&self, provider_id: i64) -> Result<Option<ProviderRecord>, CatalogError> {
        let query = format!("SELECT {PROVIDER_COLUMNS} FROM ai_providers WHERE id = $1");
        let provider = sqlx::query_as(&query)
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(provider)
    }

    /// Create a provider
    pub async fn create_provider(&self, new: NewProvider) -> Result<ProviderRecord, CatalogError> {
        let query = format!(
            "INSERT INTO ai_providers \
                 (code, name, display_name, api_type, base_url, doc_url, icon, \
                  is_enabled, priority, capabilities, config_schema) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {PROVIDER_COLUMNS}"
        );

        let provider = sqlx::query_as(&query)
            .bind(&new.code)
            .bind(&new.name)
            .bind(&new.display_name)
            .bind(new.api_type.as_str())
            .bind(&new.base_url)
            .bind(&new.doc_url)
            .bind(&new.icon)
            .bind(new.is_enabled)
            .bind(new.priority)
            .bind(&new.capabilities)
            .bind(&new.config_schema)
            .fetch_one(&self.pool)
            .await?;

        self.clear_cache();
        Ok(provider)
    }

    /// Apply a partial update to a provider
    pub async fn update_provider(
        &self,
        provider_id: i64,
        patch: ProviderPatch,
    ) -> Result<Option<ProviderRecord>, CatalogError> {
        if patch.is_empty() {
            return self.get_provider_by_id(provider_id).await;
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE ai_providers SET ");
        let mut updates = builder.separated(", ");

        if let Some(name) = &patch.name {
            updates.push("name = ").push_bind_unseparated(name);
        }
        if let Some(display_name) = &patch.display_name {
            updates.push("display_name = ").push_bind_unseparated(display_name);
        }
        if let Some(api_type) = patch.api_type {
            updates.push("api_type = ").push_bind_unseparated(api_type.as_str());
        }
        if let Some(base_url) = &patch.base_url {
            updates.push("base_url = ").push_bind_unseparated(base_url);
        }
        if let Some(doc_url) = &patch.doc_url {
            updates.push("doc_url = ").push_bind_unseparated(doc_url);
        }
        if let Some(icon) = &patch.icon {
            updates.push("icon = ").push_bind_unseparated(icon);
        }
        if let Some(is_enabled) = patch.is_enabled {
            updates.push("is_enabled = ").push_bind_unseparated(is_enabled);
        }
        if let Some(priority) = patch.priority {
            updates.push("priority = ").push_bind_unseparated(priority);
        }
        if let Some(capabilities) = &patch.capabilities {
            updates.push("capabilities = ").push_bind_unseparated(capabilities);
        }
        if let Some(config_schema) = &patch.config_schema {
            updates.push("config_schema = ").push_bind_unseparated(config_schema);
        }

        builder
            .push(" WHERE id = ")
            .push_bind(provider_id)
            .push(format!(" RETURNING {PROVIDER_COLUMNS}"));

        let provider: Option<ProviderRecord> =
            builder.build_query_as().fetch_optional(&self.pool).await?;

        if provider.is_some() {
            self.clear_cache();
        }

        Ok(provider)
    }

    /// Delete a provider and everything that referenced it
    ///
    /// Routing rows pointing at the provider's credentials or models
    /// (primary and fallback slots) are nulled out before the
    /// credentials are deleted; models cascade at the storage layer.
    pub async fn delete_provider(&self, provider_id: i64) -> Result<bool, CatalogError> {
        let mut tx = self.pool.begin().await?;

        let credential_ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM ai_credentials WHERE provider_id = $1")
                .bind(provider_id)
                .fetch_all(&mut *tx)
                .await?;

        if !credential_ids.is_empty() {
            sqlx::query(
                "UPDATE ai_task_routing SET credential_id = NULL WHERE credential_id = ANY($1)",
            )
            .bind(&credential_ids)
            .execute(&mut *tx)
            .await?;
        }

        let model_ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM ai_models WHERE provider_id = $1")
            .bind(provider_id)
            .fetch_all(&mut *tx)
            .await?;

        if !model_ids.is_empty() {
            sqlx::query(
                "UPDATE ai_task_routing SET primary_model_id = NULL WHERE primary_model_id = ANY($1)",
            )
            .bind(&model_ids)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "UPDATE ai_task_routing SET fallback_model_id = NULL WHERE fallback_model_id = ANY($1)",
            )
            .bind(&model_ids)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM ai_credentials WHERE provider_id = $1")
            .bind(provider_id)
            .execute(&mut *tx)
            .await?;

        let deleted: Option<i64> =
            sqlx::query_scalar("DELETE FROM ai_providers WHERE id = $1 RETURNING id")
                .bind(provider_id)
                .fetch_optional(&mut *tx)
                .await?;

        tx.commit().await?;

        if deleted.is_some() {
            self.clear_cache();
            return Ok(true);
        }
        Ok(false)
    }

    /// List models with optional provider/type filters
    ///
    /// Ordered by explicit sort hint, then enablement, then provider
    /// priority, then display name.
    pub async fn list_models(&self, filter: ModelFilter<'_>) -> Result<Vec<ModelRecord>, CatalogError> {
        let query = format!(
            "SELECT {MODEL_COLUMNS} \
             FROM ai_models m JOIN ai_providers p ON m.provider_id = p.id \
             WHERE ($1::text IS NULL OR p.code = $1) \
               AND ($2::text IS NULL OR m.model_type = $2) \
               AND ($3 = FALSE OR m.is_enabled = TRUE) \
             ORDER BY \
               COALESCE((m.capabilities->>'sort')::int, 999999) ASC, \
               m.is_enabled DESC, \
               p.priority DESC, \
               m.display_name"
        );

        let models = sqlx::query_as(&query)
            .bind(filter.provider_code)
            .bind(filter.model_type)
            .bind(filter.enabled_only)
            .fetch_all(&self.pool)
            .await?;

        Ok(models)
    }

    /// Get a model by identifier, optionally scoped to a provider code
    pub async fn get_model(
        &self,
        model_id: &str,
        provider_code: Option<&str>,
    ) -> Result<Option<ModelRecord>, CatalogError> {
        let cache_key = format!("{}:{model_id}", provider_code.unwrap_or(""));
        if let Some(model) = self.lock_models().get(&cache_key) {
            return Ok(Some(model.clone()));
        }

        let query = format!(
            "SELECT {MODEL_COLUMNS} \
             FROM ai_models m JOIN ai_providers p ON m.provider_id = p.id \
             WHERE m.model_id = $1 AND ($2::text IS NULL OR p.code = $2) \
             LIMIT 1"
        );

        let model: Option<ModelRecord> = sqlx::query_as(&query)
            .bind(model_id)
            .bind(provider_code)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(model) = &model {
            self.lock_models().insert(cache_key, model.clone());
        }

        Ok(model)
    }

    /// Get a model by database id (uncached; used by admin paths)
    pub async fn get_model_by_id(&self, model_db_id: i64) -> Result<Option<ModelRecord>, CatalogError> {
        let query = format!(
            "SELECT {MODEL_COLUMNS} \
             FROM ai_models m JOIN ai_providers p ON m.provider_id = p.id \
             WHERE m.id = $1"
        );

        let model = sqlx::query_as(&query)
            .bind(model_db_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(model)
    }

    /// Create a model under an existing provider
    pub async fn create_model(&self, new: NewModel) -> Result<ModelRecord, CatalogError> {
        let provider = self
            .get_provider(&new.provider_code)
            .await?
            .ok_or_else(|| CatalogError::ProviderNotFound {
                code: new.provider_code.clone(),
            })?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO ai_models \
                 (provider_id, model_id, display_name, model_type, context_window, \
                  max_output_tokens, input_cost_per_1k, output_cost_per_1k, capabilities, is_enabled) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING id",
        )
        .bind(provider.id)
        .bind(&new.model_id)
        .bind(&new.display_name)
        .bind(&new.model_type)
        .bind(new.context_window)
        .bind(new.max_output_tokens)
        .bind(new.input_cost_per_1k)
        .bind(new.output_cost_per_1k)
        .bind(&new.capabilities)
        .bind(new.is_enabled)
        .fetch_one(&self.pool)
        .await?;

        self.clear_cache();

        Ok(ModelRecord {
            id,
            provider_id: provider.id,
            provider_code: provider.code,
            model_id: new.model_id,
            display_name: new.display_name,
            model_type: new.model_type,
            context_window: new.context_window,
            max_output_tokens: new.max_output_tokens,
            input_cost_per_1k: new.input_cost_per_1k,
            output_cost_per_1k: new.output_cost_per_1k,
            capabilities: new.capabilities,
            is_enabled: new.is_enabled,
        })
    }

    /// Apply a partial update to a model
    pub async fn update_model(
        &self,
        model_db_id: i64,
        patch: ModelPatch,
    ) -> Result<Option<ModelRecord>, CatalogError> {
        if patch.is_empty() {
            return self.get_model_by_id(model_db_id).await;
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE ai_models SET ");
        let mut updates = builder.separated(", ");

        if let Some(display_name) = &patch.display_name {
            updates.push("display_name = ").push_bind_unseparated(display_name);
        }
        if let Some(model_type) = &patch.model_type {
            updates.push("model_type = ").push_bind_unseparated(model_type);
        }
        if let Some(context_window) = patch.context_window {
            updates.push("context_window = ").push_bind_unseparated(context_window);
        }
        if let Some(max_output_tokens) = patch.max_output_tokens {
            updates
                .push("max_output_tokens = ")
                .push_bind_unseparated(max_output_tokens);
        }
        if let Some(input_cost) = patch.input_cost_per_1k {
            updates.push("input_cost_per_1k = ").push_bind_unseparated(input_cost);
        }
        if let Some(output_cost) = patch.output_cost_per_1k {
            updates.push("output_cost_per_1k = ").push_bind_unseparated(output_cost);
        }
        if let Some(capabilities) = &patch.capabilities {
            updates.push("capabilities = ").push_bind_unseparated(capabilities);
        }
        if let Some(is_enabled) = patch.is_enabled {
            updates.push("is_enabled = ").push_bind_unseparated(is_enabled);
        }

        builder.push(" WHERE id = ").push_bind(model_db_id).push(" RETURNING id");

        let updated: Option<i64> = builder.build_query_scalar().fetch_optional(&self.pool).await?;
        if updated.is_none() {
            return Ok(None);
        }

        self.clear_cache();
        self.get_model_by_id(model_db_id).await
    }

    /// Delete a model, first clearing any routing references to it
    pub async fn delete_model(&self, model_db_id: i64) -> Result<bool, CatalogError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE ai_task_routing SET primary_model_id = NULL WHERE primary_model_id = $1")
            .bind(model_db_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE ai_task_routing SET fallback_model_id = NULL WHERE fallback_model_id = $1")
            .bind(model_db_id)
            .execute(&mut *tx)
            .await?;

        let deleted: Option<i64> = sqlx::query_scalar("DELETE FROM ai_models WHERE id = $1 RETURNING id")
            .bind(model_db_id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;

        if deleted.is_some() {
            self.clear_cache();
            return Ok(true);
        }
        Ok(false)
    }

    /// Insert a batch of models, silently skipping ones that already exist
    ///
    /// Returns the number of rows actually inserted.
    pub async fn bulk_insert_models(
        &self,
        provider_code: &str,
        models: Vec<NewModel>,
    ) -> Result<u64, CatalogError> {
        if models.is_empty() {
            return Ok(0);
        }

        let Some(provider) = self.get_provider(provider_code).await? else {
            return Ok(0);
        };

        let mut inserted = 0;
        let mut tx = self.pool.begin().await?;

        for model in &models {
            let result = sqlx::query(
                "INSERT INTO ai_models \
                     (provider_id, model_id, display_name, model_type, context_window, \
                      max_output_tokens, input_cost_per_1k, output_cost_per_1k, capabilities, is_enabled) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                 ON CONFLICT (provider_id, model_id) DO NOTHING",
            )
            .bind(provider.id)
            .bind(&model.model_id)
            .bind(&model.display_name)
            .bind(&model.model_type)
            .bind(model.context_window)
            .bind(model.max_output_tokens)
            .bind(model.input_cost_per_1k)
            .bind(model.output_cost_per_1k)
            .bind(&model.capabilities)
            .bind(model.is_enabled)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;
        self.clear_cache();

        Ok(inserted)
    }

    /// Delete a provider's models, optionally scoped to a sync source
    ///
    /// The source marker lives at `capabilities->>'source'` and
    /// distinguishes remotely-synced models from manually-entered ones.
    pub async fn delete_models_by_provider(
        &self,
        provider_code: &str,
        source: Option<&str>,
    ) -> Result<u64, CatalogError> {
        let Some(provider) = self.get_provider(provider_code).await? else {
            return Ok(0);
        };

        let deleted = if let Some(source) = source {
            sqlx::query(
                "DELETE FROM ai_models \
                 WHERE provider_id = $1 AND COALESCE(capabilities->>'source', '') = $2",
            )
            .bind(provider.id)
            .bind(source)
            .execute(&self.pool)
            .await?
            .rows_affected()
        } else {
            sqlx::query("DELETE FROM ai_models WHERE provider_id = $1")
                .bind(provider.id)
                .execute(&self.pool)
                .await?
                .rows_affected()
        };

        if deleted > 0 {
            self.clear_cache();
        }

        Ok(deleted)
    }

    /// Toggle the enablement flag on a batch of models
    pub async fn batch_toggle_models(&self, ids: &[i64], enabled: bool) -> Result<u64, CatalogError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let updated = sqlx::query("UPDATE ai_models SET is_enabled = $2 WHERE id = ANY($1)")
            .bind(ids)
            .bind(enabled)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated > 0 {
            self.clear_cache();
        }

        Ok(updated)
    }

    /// Persist explicit sort hints into model capability maps
    pub async fn update_models_sort(&self, items: &[ModelSortUpdate]) -> Result<usize, CatalogError> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for item in items {
            sqlx::query(
                "UPDATE ai_models \
                 SET capabilities = COALESCE(capabilities, '{}'::jsonb) || $2 \
                 WHERE id = $1",
            )
            .bind(item.id)
            .bind(serde_json::json!({ "sort": item.sort }))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.clear_cache();

        Ok(items.len())
    }

    /// Drop both lookup caches
    pub fn clear_cache(&self) {
        self.lock_providers().clear();
        self.lock_models().clear();
    }

    fn lock_providers(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProviderRecord>> {
        self.provider_cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_models(&self) -> std::sync::MutexGuard<'_, HashMap<String, ModelRecord>> {
        self.model_cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
