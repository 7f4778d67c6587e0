use http::StatusCode;
use scribe_core::HttpError;
use thiserror::Error;

/// Errors that can occur during dispatch
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Explicitly requested model does not exist
    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    /// No credential could be resolved for a provider
    #[error("credential not found for provider: {provider}")]
    CredentialNotFound { provider: String },

    /// Upstream provider returned an error
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Error during a streaming response
    #[error("streaming error: {0}")]
    Streaming(String),

    /// Caller sent a malformed or unsupported request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Routing table access failed
    #[error(transparent)]
    Routing(#[from] scribe_routing::RoutingError),

    /// Catalog access failed
    #[error(transparent)]
    Catalog(#[from] scribe_catalog::CatalogError),
}

impl HttpError for DispatchError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            Self::CredentialNotFound { .. } | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Streaming(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Routing(e) => e.status_code(),
            Self::Catalog(e) => e.status_code(),
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::ModelNotFound { .. } => "not_found_error",
            Self::CredentialNotFound { .. } | Self::InvalidRequest(_) => "invalid_request_error",
            Self::Upstream(_) => "upstream_error",
            Self::Streaming(_) => "streaming_error",
            Self::Routing(e) => e.error_type(),
            Self::Catalog(e) => e.error_type(),
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Routing(e) => e.client_message(),
            Self::Catalog(e) => e.client_message(),
            other => other.to_string(),
        }
    }
}
