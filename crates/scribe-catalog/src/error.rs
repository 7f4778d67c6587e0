use http::StatusCode;
use scribe_core::HttpError;
use thiserror::Error;

/// Errors from the catalog and credential store
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Underlying database failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failure
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Referenced provider does not exist
    #[error("provider not found: {code}")]
    ProviderNotFound { code: String },

    /// Credential could not be encrypted for storage
    #[error("credential encryption failed")]
    Encrypt,

    /// Stored credential could not be decrypted
    #[error("credential decryption failed")]
    Decrypt,
}

impl HttpError for CatalogError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ProviderNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Migration(_) | Self::Encrypt | Self::Decrypt => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::ProviderNotFound { .. } => "not_found_error",
            Self::Database(_) | Self::Migration(_) => "database_error",
            Self::Encrypt | Self::Decrypt => "credential_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::ProviderNotFound { .. } => self.to_string(),
            Self::Database(_) | Self::Migration(_) => "a storage error occurred".to_owned(),
            Self::Encrypt | Self::Decrypt => "a credential error occurred".to_owned(),
        }
    }
}
