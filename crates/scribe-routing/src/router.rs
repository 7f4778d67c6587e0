//! Routing resolution: (task, user) → model + credential + parameters

use std::sync::Arc;

use scribe_catalog::{CredentialInfo, CredentialResolver, ModelRecord, ProviderRegistry};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::RoutingError;
use crate::update::RoutingUpdate;

/// Default sampling temperature when neither the routing row nor the
/// task type specifies one
const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Fully resolved routing for one task invocation
#[derive(Debug, Clone)]
pub struct TaskRoute {
    pub task_type: String,
    pub model: ModelRecord,
    pub credential: CredentialInfo,
    pub temperature: f64,
    pub max_tokens: Option<i32>,
    pub prompt_template: Option<String>,
    pub fallback_model: Option<ModelRecord>,
}

/// A task type as listed to admin callers
#[derive(Debug, Clone, Serialize)]
pub struct TaskTypeInfo {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub model_type: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i32>,
}

#[derive(sqlx::FromRow)]
struct RoutingRow {
    config_override: Value,
    credential_id: Option<i64>,
    custom_prompt: Option<String>,
    default_temperature: Option<f64>,
    default_max_tokens: Option<i32>,
    default_prompt: Option<String>,
    primary_model: Option<String>,
    primary_provider_code: Option<String>,
    fallback_model: Option<String>,
    fallback_provider_code: Option<String>,
}

/// Service for routing AI tasks to appropriate models
///
/// Resolution prefers a user-specific routing row over the system
/// (null-user) row; an absent or incomplete row is "no routing", not an
/// error, so callers can fall back to environment configuration.
pub struct ModelRouter {
    pool: PgPool,
    registry: Arc<ProviderRegistry>,
    credentials: Arc<CredentialResolver>,
}

impl ModelRouter {
    pub fn new(pool: PgPool, registry: Arc<ProviderRegistry>, credentials: Arc<CredentialResolver>) -> Self {
        Self {
            pool,
            registry,
            credentials,
        }
    }

    /// Registry shared with this router
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Credential resolver shared with this router
    pub fn credentials(&self) -> &Arc<CredentialResolver> {
        &self.credentials
    }

    /// Resolve complete routing for a task
    ///
    /// Returns `None` when no enabled routing row exists, the row has no
    /// primary model, or no credential is resolvable; callers treat all
    /// of these as "use environment fallback".
    pub async fn resolve_routing(
        &self,
        task_type: &str,
        user_id: Option<i64>,
    ) -> Result<Option<TaskRoute>, RoutingError> {
        let row: Option<RoutingRow> = sqlx::query_as(
            "SELECT r.config_override, r.credential_id, r.prompt_template AS custom_prompt, \
                    tt.default_temperature, tt.default_max_tokens, \
                    tt.prompt_template AS default_prompt, \
                    pm.model_id AS primary_model, pp.code AS primary_provider_code, \
                    fm.model_id AS fallback_model, fp.code AS fallback_provider_code \
             FROM ai_task_routing r \
             JOIN ai_task_types tt ON r.task_type_id = tt.id \
             LEFT JOIN ai_models pm ON r.primary_model_id = pm.id \
             LEFT JOIN ai_providers pp ON pm.provider_id = pp.id \
             LEFT JOIN ai_models fm ON r.fallback_model_id = fm.id \
             LEFT JOIN ai_providers fp ON fm.provider_id = fp.id \
             WHERE tt.code = $1 \
               AND (r.user_id = $2 OR r.user_id IS NULL) \
               AND r.is_enabled = TRUE \
             ORDER BY r.user_id NULLS LAST \
             LIMIT 1",
        )
        .bind(task_type)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            tracing::warn!(task_type, "no routing found for task");
            return Ok(None);
        };
        let Some(primary_model_id) = &row.primary_model else {
            tracing::warn!(task_type, "routing row has no primary model");
            return Ok(None);
        };

        let Some(model) = self
            .registry
            .get_model(primary_model_id, row.primary_provider_code.as_deref())
            .await?
        else {
            tracing::error!(task_type, model = %primary_model_id, "routed primary model not found");
            return Ok(None);
        };

        let fallback_model = match &row.fallback_model {
            Some(fallback_id) => {
                self.registry
                    .get_model(fallback_id, row.fallback_provider_code.as_deref())
                    .await?
            }
            None => None,
        };

        let Some(credential) = self
            .credentials
            .get_credential(&model.provider_code, user_id, row.credential_id)
            .await?
        else {
            tracing::error!(
                task_type,
                provider = %model.provider_code,
                "no credential found for routed provider"
            );
            return Ok(None);
        };

        let (temperature, max_tokens) =
            effective_generation(&row.config_override, row.default_temperature, row.default_max_tokens);
        let prompt_template = row.custom_prompt.or(row.default_prompt);

        Ok(Some(TaskRoute {
            task_type: task_type.to_owned(),
            model,
            credential,
            temperature,
            max_tokens,
            prompt_template,
            fallback_model,
        }))
    }

    /// List all available task types
    pub async fn list_task_types(&self) -> Result<Vec<TaskTypeInfo>, RoutingError> {
        #[derive(sqlx::FromRow)]
        struct TaskTypeRow {
            code: String,
            name: String,
            description: Option<String>,
            default_model_type: String,
            default_temperature: Option<f64>,
            default_max_tokens: Option<i32>,
        }

        let rows: Vec<TaskTypeRow> = sqlx::query_as(
            "SELECT code, name, description, default_model_type, \
                    default_temperature, default_max_tokens \
             FROM ai_task_types \
             ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| TaskTypeInfo {
                code: row.code,
                name: row.name,
                description: row.description,
                model_type: row.default_model_type,
                temperature: row.default_temperature,
                max_tokens: row.default_max_tokens,
            })
            .collect())
    }

    /// Create or update the routing row for a (user, task) pair
    ///
    /// Only fields explicitly marked in the update are overwritten; a
    /// field set to `Clear` still overwrites, to null. Returns `false`
    /// when the task type does not exist.
    pub async fn update_routing(
        &self,
        task_type: &str,
        user_id: Option<i64>,
        update: RoutingUpdate,
    ) -> Result<bool, RoutingError> {
        // A NOT NULL jsonb column backs config_override, so clearing it
        // writes an empty object rather than SQL NULL.
        let config_value = update
            .config_override
            .as_option()
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        let affected = sqlx::query(
            "INSERT INTO ai_task_routing \
                 (user_id, task_type_id, primary_model_id, fallback_model_id, \
                  credential_id, config_override, prompt_template) \
             SELECT $1, tt.id, $2, $3, $4, $5, $6 \
             FROM ai_task_types tt WHERE tt.code = $7 \
             ON CONFLICT ON CONSTRAINT uq_ai_task_routing_user_task \
             DO UPDATE SET \
                 primary_model_id = CASE WHEN $8 THEN EXCLUDED.primary_model_id \
                                         ELSE ai_task_routing.primary_model_id END, \
                 fallback_model_id = CASE WHEN $9 THEN EXCLUDED.fallback_model_id \
                                          ELSE ai_task_routing.fallback_model_id END, \
                 credential_id = CASE WHEN $10 THEN EXCLUDED.credential_id \
                                      ELSE ai_task_routing.credential_id END, \
                 config_override = CASE WHEN $11 THEN EXCLUDED.config_override \
                                        ELSE ai_task_routing.config_override END, \
                 prompt_template = CASE WHEN $12 THEN EXCLUDED.prompt_template \
                                        ELSE ai_task_routing.prompt_template END",
        )
        .bind(user_id)
        .bind(update.primary_model_id.as_option().copied())
        .bind(update.fallback_model_id.as_option().copied())
        .bind(update.credential_id.as_option().copied())
        .bind(&config_value)
        .bind(update.prompt_template.as_option().map(String::as_str))
        .bind(task_type)
        .bind(update.primary_model_id.is_update())
        .bind(update.fallback_model_id.is_update())
        .bind(update.credential_id.is_update())
        .bind(update.config_override.is_update())
        .bind(update.prompt_template.is_update())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected > 0)
    }
}

/// Compute effective generation parameters
///
/// The routing row's config override wins over the task type defaults;
/// an absent temperature everywhere lands on 0.7, and an absent
/// max_tokens means unlimited.
fn effective_generation(
    config_override: &Value,
    default_temperature: Option<f64>,
    default_max_tokens: Option<i32>,
) -> (f64, Option<i32>) {
    let temperature = config_override
        .get("temperature")
        .and_then(Value::as_f64)
        .or(default_temperature)
        .unwrap_or(DEFAULT_TEMPERATURE);

    let max_tokens = config_override
        .get("max_tokens")
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
        .or(default_max_tokens);

    (temperature, max_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_beats_task_defaults() {
        let config = serde_json::json!({ "temperature": 0.2, "max_tokens": 512 });
        let (temperature, max_tokens) = effective_generation(&config, Some(0.9), Some(1024));
        assert!((temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(max_tokens, Some(512));
    }

    #[test]
    fn task_defaults_apply_without_override() {
        let config = serde_json::json!({});
        let (temperature, max_tokens) = effective_generation(&config, Some(0.9), Some(1024));
        assert!((temperature - 0.9).abs() < f64::EPSILON);
        assert_eq!(max_tokens, Some(1024));
    }

    #[test]
    fn fully_absent_parameters_fall_back() {
        let config = serde_json::json!({});
        let (temperature, max_tokens) = effective_generation(&config, None, None);
        assert!((temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(max_tokens, None);
    }

    #[test]
    fn explicit_zero_temperature_is_respected() {
        let config = serde_json::json!({ "temperature": 0.0 });
        let (temperature, _) = effective_generation(&config, Some(0.9), None);
        assert!(temperature.abs() < f64::EPSILON);
    }
}
