//! Durable usage logging with degraded-mode capture
//!
//! `record` persists one `ai_usage_logs` row per completed request. The
//! business outcome is already decided by the time this runs, so a
//! failed write never reaches the caller: it is classified, handed to
//! the metrics store, and logged.

use std::sync::Arc;

use sqlx::PgPool;

use crate::classify::classify_error;
use crate::metrics::{MetricsStore, UsageLogFailure};

/// One request's usage, as assembled by the endpoint layer
///
/// `task_type`, `provider_code`/`model_id`, and `estimated_cost` may be
/// left unset; they are derived from the endpoint path, the combined
/// model string, and the per-1k costs respectively.
#[derive(Debug, Clone, Default)]
pub struct UsageRecord {
    pub user_id: String,
    pub endpoint: String,
    pub task_type: Option<String>,
    pub provider_code: Option<String>,
    pub model_id: Option<String>,
    /// Combined model string as dispatched, e.g. `openai/gpt-4o-mini`
    pub model: Option<String>,
    pub request_chars: i32,
    pub response_chars: i32,
    pub tokens_in: i32,
    pub tokens_out: i32,
    pub latency_ms: i32,
    pub estimated_cost: Option<f64>,
    /// Per-1k costs used when `estimated_cost` is not supplied
    pub input_cost_per_1k: Option<f64>,
    pub output_cost_per_1k: Option<f64>,
    pub success: bool,
    pub cached: bool,
    pub error_code: Option<String>,
    pub request_id: Option<String>,
}

/// Durable usage logger
pub struct UsageLogger {
    pool: PgPool,
    metrics: Arc<MetricsStore>,
}

impl UsageLogger {
    pub fn new(pool: PgPool, metrics: Arc<MetricsStore>) -> Self {
        Self { pool, metrics }
    }

    /// Persist one usage row; never fails the caller
    pub async fn record(&self, record: UsageRecord) {
        let task_type = record
            .task_type
            .clone()
            .or_else(|| infer_task_type(&record.endpoint));

        let (derived_provider, derived_model) = record
            .model
            .as_deref()
            .map(split_model)
            .unwrap_or_default();
        let provider_code = record.provider_code.clone().or(derived_provider);
        let model_id = record.model_id.clone().or(derived_model);

        let estimated_cost = record.estimated_cost.unwrap_or_else(|| {
            estimate_cost(
                record.tokens_in,
                record.tokens_out,
                record.input_cost_per_1k,
                record.output_cost_per_1k,
            )
        });

        let total_tokens = record.tokens_in.saturating_add(record.tokens_out);

        let result = sqlx::query(
            "INSERT INTO ai_usage_logs \
                 (user_id, endpoint, task_type, provider_code, model_id, model, \
                  request_chars, response_chars, tokens_in, tokens_out, total_tokens, \
                  latency_ms, estimated_cost, success, cached, error_code, request_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(&record.user_id)
        .bind(&record.endpoint)
        .bind(&task_type)
        .bind(&provider_code)
        .bind(&model_id)
        .bind(&record.model)
        .bind(record.request_chars)
        .bind(record.response_chars)
        .bind(record.tokens_in)
        .bind(record.tokens_out)
        .bind(total_tokens)
        .bind(record.latency_ms)
        .bind(estimated_cost)
        .bind(record.success)
        .bind(record.cached)
        .bind(&record.error_code)
        .bind(&record.request_id)
        .execute(&self.pool)
        .await;

        if let Err(error) = result {
            let category = classify_error(error_class(&error), &error.to_string());
            let outcome = self.metrics.record_usage_log_failure(&UsageLogFailure {
                endpoint: record.endpoint.clone(),
                category,
                message: error.to_string(),
                request_id: record.request_id.clone(),
                business_success: record.success,
            });

            tracing::warn!(
                endpoint = %record.endpoint,
                request_id = ?record.request_id,
                category = %category,
                failures_total = outcome.failure_count,
                alert = outcome.alert_triggered,
                error = %error,
                "usage log write failed"
            );
        }
    }
}

/// Variant name of a sqlx error, for classification
fn error_class(error: &sqlx::Error) -> &'static str {
    match error {
        sqlx::Error::Configuration(_) => "Configuration",
        sqlx::Error::Database(_) => "DatabaseError",
        sqlx::Error::Io(_) => "Io",
        sqlx::Error::Tls(_) => "Tls",
        sqlx::Error::Protocol(_) => "Protocol",
        sqlx::Error::RowNotFound => "RowNotFound",
        sqlx::Error::ColumnNotFound(_) => "ColumnNotFound",
        sqlx::Error::PoolTimedOut => "PoolTimedOut",
        sqlx::Error::PoolClosed => "PoolClosed",
        sqlx::Error::WorkerCrashed => "WorkerCrashed",
        _ => "Unknown",
    }
}

/// Infer the task type from an endpoint path
///
/// The segment immediately following the literal `ai` segment wins;
/// otherwise the last segment stands in.
pub fn infer_task_type(endpoint: &str) -> Option<String> {
    let segments: Vec<&str> = endpoint.split('/').filter(|s| !s.is_empty()).collect();

    if let Some(position) = segments.iter().position(|s| *s == "ai")
        && position + 1 < segments.len()
    {
        return Some(segments[position + 1].to_owned());
    }

    segments.last().map(|s| (*s).to_owned())
}

/// Split a combined `provider/model` string
pub fn split_model(combined: &str) -> (Option<String>, Option<String>) {
    match combined.split_once('/') {
        Some((provider, model)) => (Some(provider.to_owned()), Some(model.to_owned())),
        None => (None, Some(combined.to_owned())),
    }
}

/// Estimate request cost from per-1k token prices
///
/// Missing prices count as zero; the result is rounded half-up to
/// 8 decimal places.
pub fn estimate_cost(
    tokens_in: i32,
    tokens_out: i32,
    input_cost_per_1k: Option<f64>,
    output_cost_per_1k: Option<f64>,
) -> f64 {
    let input_cost = input_cost_per_1k.unwrap_or(0.0);
    let output_cost = output_cost_per_1k.unwrap_or(0.0);

    let cost = (input_cost * f64::from(tokens_in) + output_cost * f64::from(tokens_out)) / 1000.0;

    (cost * 1e8).round() / 1e8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_type_follows_the_ai_segment() {
        assert_eq!(infer_task_type("/api/v1/ai/summary"), Some("summary".to_owned()));
        assert_eq!(infer_task_type("/api/ai/translate"), Some("translate".to_owned()));
    }

    #[test]
    fn task_type_falls_back_to_last_segment() {
        assert_eq!(infer_task_type("/healthz"), Some("healthz".to_owned()));
        assert_eq!(infer_task_type("/api/v1/ai"), Some("ai".to_owned()));
        assert_eq!(infer_task_type(""), None);
    }

    #[test]
    fn combined_model_splits_on_first_slash() {
        assert_eq!(
            split_model("openai/gpt-4o"),
            (Some("openai".to_owned()), Some("gpt-4o".to_owned()))
        );
        assert_eq!(split_model("gpt-4o"), (None, Some("gpt-4o".to_owned())));
    }

    #[test]
    fn cost_follows_per_1k_formula() {
        let cost = estimate_cost(1000, 500, Some(0.001), Some(0.002));
        assert!((cost - 0.002).abs() < 1e-12);
    }

    #[test]
    fn missing_costs_count_as_zero() {
        assert!(estimate_cost(1000, 500, None, None).abs() < f64::EPSILON);
        let cost = estimate_cost(1000, 500, Some(0.001), None);
        assert!((cost - 0.001).abs() < 1e-12);
    }

    #[test]
    fn cost_rounds_half_up_at_eight_decimals() {
        // 15 * 0.000001 / 1000 = 0.000000015 -> rounds up to 0.00000002
        let cost = estimate_cost(15, 0, Some(0.000_001), None);
        assert!((cost - 0.000_000_02).abs() < 1e-12);

        // 14 * 0.000001 / 1000 = 0.000000014 -> rounds down to 0.00000001
        let cost = estimate_cost(14, 0, Some(0.000_001), None);
        assert!((cost - 0.000_000_01).abs() < 1e-12);
    }
}
