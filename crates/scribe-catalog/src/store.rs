//! Postgres pool construction and embedded schema migrations

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::CatalogError;

/// Connect to the relational store
///
/// # Errors
///
/// Returns an error if the URL is invalid or the connection fails
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, CatalogError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;

    Ok(pool)
}

/// Apply pending schema migrations
///
/// # Errors
///
/// Returns an error if a migration fails to apply
pub async fn migrate(pool: &PgPool) -> Result<(), CatalogError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::debug!("catalog schema up to date");
    Ok(())
}
