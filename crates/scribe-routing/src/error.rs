use http::StatusCode;
use scribe_catalog::CatalogError;
use scribe_core::HttpError;
use thiserror::Error;

/// Errors from routing resolution and updates
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Underlying database failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failure in the catalog while resolving a routed model/credential
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl HttpError for RoutingError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Catalog(e) => e.status_code(),
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Database(_) => "database_error",
            Self::Catalog(e) => e.error_type(),
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Database(_) => "a storage error occurred".to_owned(),
            Self::Catalog(e) => e.client_message(),
        }
    }
}
