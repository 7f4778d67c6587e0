//! Postgres-backed test support
//!
//! Database tests run only when `SCRIBE_TEST_DATABASE_URL` points at a
//! disposable Postgres instance; otherwise they skip silently. Each
//! test works with uniquely-named rows so tests can run concurrently
//! against the same database.

use scribe_catalog::registry::{ModelRecord, NewModel, NewProvider, ProviderRecord, ProviderRegistry};
use scribe_core::ApiType;
use sqlx::PgPool;
use uuid::Uuid;

/// Connect to the test database, or `None` when not configured
pub async fn test_pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("SCRIBE_TEST_DATABASE_URL") else {
        eprintln!("skipping: SCRIBE_TEST_DATABASE_URL not set");
        return None;
    };

    let pool = scribe_catalog::store::connect(&url, 5)
        .await
        .expect("connect to test database");
    scribe_catalog::store::migrate(&pool)
        .await
        .expect("migrate test database");

    Some(pool)
}

/// A unique identifier so concurrent tests never collide
pub fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

/// Insert a task type row, returning its code
pub async fn seed_task_type(pool: &PgPool, prompt_template: Option<&str>) -> String {
    let code = unique("task");

    sqlx::query(
        "INSERT INTO ai_task_types \
             (code, name, default_model_type, default_temperature, default_max_tokens, prompt_template) \
         VALUES ($1, $2, 'chat', $3, $4, $5)",
    )
    .bind(&code)
    .bind(format!("Test task {code}"))
    .bind(0.5_f64)
    .bind(512_i32)
    .bind(prompt_template)
    .execute(pool)
    .await
    .expect("insert task type");

    code
}

/// Create an OpenAI-compatible provider pointing at `base_url`
pub async fn seed_provider(registry: &ProviderRegistry, base_url: Option<&str>) -> ProviderRecord {
    registry
        .create_provider(NewProvider {
            code: unique("provider"),
            name: "Test provider".to_owned(),
            display_name: None,
            api_type: ApiType::OpenaiCompat,
            base_url: base_url.map(ToOwned::to_owned),
            doc_url: None,
            icon: None,
            is_enabled: true,
            priority: 0,
            capabilities: serde_json::json!({}),
            config_schema: None,
        })
        .await
        .expect("create provider")
}

/// Create a chat model under an existing provider
pub async fn seed_model(registry: &ProviderRegistry, provider_code: &str, model_id: &str) -> ModelRecord {
    registry
        .create_model(NewModel {
            provider_code: provider_code.to_owned(),
            model_id: model_id.to_owned(),
            display_name: None,
            model_type: "chat".to_owned(),
            context_window: Some(128_000),
            max_output_tokens: Some(4_096),
            input_cost_per_1k: Some(0.001),
            output_cost_per_1k: Some(0.002),
            capabilities: serde_json::json!({}),
            is_enabled: true,
        })
        .await
        .expect("create model")
}
