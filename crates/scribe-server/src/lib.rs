//! HTTP service assembly for Scribe
//!
//! Builds the application state once, wires the task, metrics, and
//! admin routes, and serves until cancelled.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod error;
pub mod extract;
mod routes;
mod state;

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{delete, get, patch, post};
use scribe_config::Config;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Assembled server with all routes and state
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
    state: AppState,
}

impl Server {
    /// Build the server from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if state construction (database, migrations)
    /// fails
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let listen_address = config.server.listen;
        let state = AppState::from_config(config).await?;
        let router = app_router(state.clone());

        Ok(Self {
            router,
            listen_address,
            state,
        })
    }

    /// Serve until the cancellation token fires
    ///
    /// # Errors
    ///
    /// Returns an error if binding or serving fails
    pub async fn serve(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        tracing::info!(address = %self.listen_address, "scribe listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        self.state.shutdown().await;
        Ok(())
    }
}

/// Build the application router
///
/// Public so integration tests can drive the service without binding a
/// socket.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/ai/metrics", get(routes::metrics::snapshot))
        .route("/api/ai/embedding", post(routes::ai::embedding))
        .route("/api/ai/admin/providers", get(routes::admin::list_providers).post(routes::admin::create_provider))
        .route(
            "/api/ai/admin/providers/{id}",
            patch(routes::admin::update_provider).delete(routes::admin::delete_provider),
        )
        .route("/api/ai/admin/models", get(routes::admin::list_models).post(routes::admin::create_model))
        .route("/api/ai/admin/models/batch-toggle", post(routes::admin::batch_toggle_models))
        .route("/api/ai/admin/models/sort", post(routes::admin::update_models_sort))
        .route(
            "/api/ai/admin/models/{id}",
            patch(routes::admin::update_model).delete(routes::admin::delete_model),
        )
        .route(
            "/api/ai/admin/credentials",
            get(routes::admin::list_credentials).post(routes::admin::save_credential),
        )
        .route("/api/ai/admin/credentials/{id}", delete(routes::admin::delete_credential))
        .route("/api/ai/admin/task-types", get(routes::admin::list_task_types))
        .route(
            "/api/ai/admin/routing/{task}",
            get(routes::admin::get_routing).put(routes::admin::update_routing),
        )
        .route("/api/ai/{task}", post(routes::ai::invoke))
        .route("/api/ai/{task}/stream", post(routes::ai::invoke_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handle `GET /healthz`
async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}
