//! Metrics snapshot endpoint

use axum::Json;
use axum::extract::State;
use scribe_usage::MetricsSnapshot;

use crate::state::AppState;

/// Handle `GET /api/ai/metrics`
pub async fn snapshot(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics().snapshot())
}
