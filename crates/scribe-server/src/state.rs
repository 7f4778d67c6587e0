//! Application state: the dependency-injection container
//!
//! Every component is constructed exactly once here and shared by
//! reference with request handlers. Lifecycle is explicit (build in
//! [`AppState::from_config`], tear down in [`AppState::shutdown`])
//! rather than lazily initialized behind null checks.

use std::collections::HashMap;
use std::sync::Arc;

use scribe_catalog::credentials::EnvCredential;
use scribe_catalog::{CredentialResolver, ProviderRegistry, store};
use scribe_config::Config;
use scribe_llm::{HttpCompletionClient, LlmRouter};
use scribe_routing::ModelRouter;
use scribe_usage::{MetricsStore, UsageLogger};
use secrecy::ExposeSecret;
use sqlx::PgPool;

/// Shared state for all route handlers
#[derive(Clone)]
pub struct AppState {
    inner: Arc<StateInner>,
}

struct StateInner {
    pool: PgPool,
    registry: Arc<ProviderRegistry>,
    credentials: Arc<CredentialResolver>,
    model_router: Arc<ModelRouter>,
    llm: Arc<LlmRouter>,
    usage: Arc<UsageLogger>,
    metrics: Arc<MetricsStore>,
}

impl AppState {
    /// Build all components from configuration
    ///
    /// Connects the pool, applies migrations, and wires the registry,
    /// credential resolver, routers, and usage accounting together.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or migrations fail
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let pool = store::connect(&config.database.url, config.database.max_connections).await?;
        store::migrate(&pool).await?;

        let registry = Arc::new(ProviderRegistry::new(pool.clone()));

        let env_credentials: HashMap<String, EnvCredential> = config
            .llm
            .env_credentials
            .iter()
            .map(|(code, cred)| {
                (
                    code.clone(),
                    EnvCredential {
                        api_type: cred.api_type,
                        api_key: cred.api_key.clone(),
                        base_url: cred.base_url.clone(),
                    },
                )
            })
            .collect();

        let credentials = Arc::new(CredentialResolver::new(
            pool.clone(),
            config.auth.shared_secret.expose_secret(),
            env_credentials,
        ));

        let model_router = Arc::new(ModelRouter::new(
            pool.clone(),
            Arc::clone(&registry),
            Arc::clone(&credentials),
        ));

        let llm = Arc::new(LlmRouter::new(
            Arc::clone(&model_router),
            Arc::new(HttpCompletionClient::new()),
            config.llm,
        ));

        let metrics = Arc::new(MetricsStore::new(
            config.usage.alert_threshold,
            config.usage.sample_limit,
        ));
        let usage = Arc::new(UsageLogger::new(pool.clone(), Arc::clone(&metrics)));

        Ok(Self {
            inner: Arc::new(StateInner {
                pool,
                registry,
                credentials,
                model_router,
                llm,
                usage,
                metrics,
            }),
        })
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.inner.registry
    }

    pub fn credentials(&self) -> &CredentialResolver {
        &self.inner.credentials
    }

    pub fn model_router(&self) -> &ModelRouter {
        &self.inner.model_router
    }

    pub fn llm(&self) -> &LlmRouter {
        &self.inner.llm
    }

    pub fn usage(&self) -> &Arc<UsageLogger> {
        &self.inner.usage
    }

    pub fn metrics(&self) -> &Arc<MetricsStore> {
        &self.inner.metrics
    }

    /// Release held resources; call once on shutdown
    pub async fn shutdown(&self) {
        self.inner.pool.close().await;
        tracing::debug!("application state shut down");
    }
}
