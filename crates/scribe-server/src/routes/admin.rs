//! Admin CRUD over providers, models, credentials, and routing
//!
//! Thin pass-throughs to the catalog and routing crates. Authorization
//! happens upstream; the caller id header scopes credential ownership.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use scribe_catalog::registry::{ModelFilter, ModelPatch, ModelSortUpdate, ProviderPatch};
use scribe_catalog::{NewModel, NewProvider, SaveCredential};
use scribe_routing::{FieldUpdate, RoutingUpdate};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::error_response;
use crate::extract::CallerId;
use crate::state::AppState;

// -- providers --

#[derive(Debug, Deserialize)]
pub struct ListProvidersQuery {
    #[serde(default)]
    pub enabled_only: bool,
}

/// Handle `GET /api/ai/admin/providers`
pub async fn list_providers(
    State(state): State<AppState>,
    Query(query): Query<ListProvidersQuery>,
) -> Response {
    match state.registry().list_providers(query.enabled_only).await {
        Ok(providers) => Json(providers).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handle `POST /api/ai/admin/providers`
pub async fn create_provider(State(state): State<AppState>, Json(body): Json<NewProvider>) -> Response {
    match state.registry().create_provider(body).await {
        Ok(provider) => (StatusCode::CREATED, Json(provider)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handle `PATCH /api/ai/admin/providers/{id}`
pub async fn update_provider(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ProviderPatch>,
) -> Response {
    match state.registry().update_provider(id, body).await {
        Ok(Some(provider)) => Json(provider).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handle `DELETE /api/ai/admin/providers/{id}`
pub async fn delete_provider(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.registry().delete_provider(id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => error_response(&e),
    }
}

// -- models --

#[derive(Debug, Default, Deserialize)]
pub struct ListModelsQuery {
    #[serde(default)]
    pub provider_code: Option<String>,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub enabled_only: bool,
}

/// Handle `GET /api/ai/admin/models`
pub async fn list_models(State(state): State<AppState>, Query(query): Query<ListModelsQuery>) -> Response {
    let filter = ModelFilter {
        provider_code: query.provider_code.as_deref(),
        model_type: query.model_type.as_deref(),
        enabled_only: query.enabled_only,
    };

    match state.registry().list_models(filter).await {
        Ok(models) => Json(models).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handle `POST /api/ai/admin/models`
pub async fn create_model(State(state): State<AppState>, Json(body): Json<NewModel>) -> Response {
    match state.registry().create_model(body).await {
        Ok(model) => (StatusCode::CREATED, Json(model)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handle `PATCH /api/ai/admin/models/{id}`
pub async fn update_model(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ModelPatch>,
) -> Response {
    match state.registry().update_model(id, body).await {
        Ok(Some(model)) => Json(model).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handle `DELETE /api/ai/admin/models/{id}`
pub async fn delete_model(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.registry().delete_model(id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchToggleBody {
    pub ids: Vec<i64>,
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct AffectedResponse {
    pub affected: u64,
}

/// Handle `POST /api/ai/admin/models/batch-toggle`
pub async fn batch_toggle_models(State(state): State<AppState>, Json(body): Json<BatchToggleBody>) -> Response {
    match state.registry().batch_toggle_models(&body.ids, body.enabled).await {
        Ok(affected) => Json(AffectedResponse { affected }).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SortBody {
    pub items: Vec<ModelSortUpdate>,
}

/// Handle `POST /api/ai/admin/models/sort`
pub async fn update_models_sort(State(state): State<AppState>, Json(body): Json<SortBody>) -> Response {
    match state.registry().update_models_sort(&body.items).await {
        Ok(affected) => Json(AffectedResponse {
            affected: affected as u64,
        })
        .into_response(),
        Err(e) => error_response(&e),
    }
}

// -- credentials --

/// Handle `GET /api/ai/admin/credentials`
pub async fn list_credentials(State(state): State<AppState>, CallerId(user_id): CallerId) -> Response {
    match state.credentials().list_credentials(user_id).await {
        Ok(credentials) => Json(credentials).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: i64,
}

/// Handle `POST /api/ai/admin/credentials`
///
/// The credential is owned by the calling user unless the body names a
/// scope explicitly (null meaning system-wide).
pub async fn save_credential(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(mut body): Json<SaveCredential>,
) -> Response {
    if body.user_id.is_none() {
        body.user_id = user_id;
    }

    match state.credentials().save_credential(body).await {
        Ok(id) => (StatusCode::CREATED, Json(CreatedResponse { id })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handle `DELETE /api/ai/admin/credentials/{id}`
pub async fn delete_credential(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(id): Path<i64>,
) -> Response {
    match state.credentials().delete_credential(id, user_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => error_response(&e),
    }
}

// -- task types and routing --

/// Handle `GET /api/ai/admin/task-types`
pub async fn list_task_types(State(state): State<AppState>) -> Response {
    match state.model_router().list_task_types().await {
        Ok(task_types) => Json(task_types).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Resolved routing as shown to admin callers (no secrets)
#[derive(Debug, Serialize)]
pub struct RoutingView {
    pub task_type: String,
    pub model_id: String,
    pub provider_code: String,
    pub fallback_model_id: Option<String>,
    pub fallback_provider_code: Option<String>,
    pub temperature: f64,
    pub max_tokens: Option<i32>,
    pub prompt_template: Option<String>,
}

/// Handle `GET /api/ai/admin/routing/{task}`
pub async fn get_routing(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(task): Path<String>,
) -> Response {
    match state.model_router().resolve_routing(&task, user_id).await {
        Ok(Some(route)) => Json(RoutingView {
            task_type: route.task_type,
            model_id: route.model.model_id,
            provider_code: route.model.provider_code,
            fallback_model_id: route.fallback_model.as_ref().map(|m| m.model_id.clone()),
            fallback_provider_code: route.fallback_model.as_ref().map(|m| m.provider_code.clone()),
            temperature: route.temperature,
            max_tokens: route.max_tokens,
            prompt_template: route.prompt_template,
        })
        .into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => error_response(&e),
    }
}

/// Wire form of a routing update
///
/// An absent field keeps the stored value, an explicit `null` clears
/// it, and a value overwrites it.
#[derive(Debug, Default, Deserialize)]
pub struct RoutingUpdateBody {
    #[serde(default, deserialize_with = "double_option")]
    pub primary_model_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub fallback_model_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub credential_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub config_override: Option<Option<serde_json::Value>>,
    #[serde(default, deserialize_with = "double_option")]
    pub prompt_template: Option<Option<String>>,
}

/// Deserialize a field so that `null` and "absent" stay distinct
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

fn to_field<T>(wire: Option<Option<T>>) -> FieldUpdate<T> {
    match wire {
        None => FieldUpdate::Keep,
        Some(None) => FieldUpdate::Clear,
        Some(Some(value)) => FieldUpdate::Set(value),
    }
}

/// Handle `PUT /api/ai/admin/routing/{task}`
pub async fn update_routing(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(task): Path<String>,
    Json(body): Json<RoutingUpdateBody>,
) -> Response {
    let update = RoutingUpdate {
        primary_model_id: to_field(body.primary_model_id),
        fallback_model_id: to_field(body.fallback_model_id),
        credential_id: to_field(body.credential_id),
        config_override: to_field(body.config_override),
        prompt_template: to_field(body.prompt_template),
    };

    match state.model_router().update_routing(&task, user_id, update).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => error_response(&e),
    }
}
