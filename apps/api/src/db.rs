use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::models::extract::PARTITION_KEY_FIELD;
use crate::storage::documents::PgDocumentStore;

/// Connects to PostgreSQL and binds the document store to its container.
/// A missing database or container aborts startup.
pub async fn connect_document_store(database_url: &str, container: &str) -> Result<PgDocumentStore> {
    info!("Connecting to PostgreSQL...");

    // Runs are sequential; a handful of connections covers handlers plus one run.
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("Failed to connect to the document store database")?;

    info!("PostgreSQL connection pool established");

    PgDocumentStore::connect(pool, container, PARTITION_KEY_FIELD)
        .await
        .with_context(|| format!("Document store container '{container}' is unavailable"))
}
