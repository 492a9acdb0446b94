//! Document store: JSON records addressed by `id` and routed by a partition key.
//!
//! `PgDocumentStore` keeps each container as a Postgres table
//! `(id TEXT PRIMARY KEY, partition_key TEXT, body JSONB, created_at TIMESTAMPTZ)`.
//! The table is never created here: a missing container is a startup error.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Container '{0}' does not exist")]
    ContainerNotFound(String),

    #[error("Invalid container name '{0}'")]
    InvalidContainer(String),

    #[error("Document is missing string field '{0}'")]
    MissingKey(&'static str),

    #[error("Document {id} not found in partition {partition_key}")]
    NotFound { id: String, partition_key: String },

    #[error("Query spans partitions but cross-partition queries are not enabled")]
    CrossPartitionDisabled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Equality filter over top-level fields, optionally pinned to one partition.
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    pub filter: Map<String, Value>,
    pub partition_key: Option<String>,
    pub cross_partition: bool,
}

impl DocumentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filter.insert(field.to_string(), value.into());
        self
    }

    pub fn in_partition(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    pub fn enable_cross_partition(mut self) -> Self {
        self.cross_partition = true;
        self
    }

    /// A query without a partition key must opt in to scanning all partitions.
    pub fn check_scope(&self) -> Result<(), StoreError> {
        if self.partition_key.is_none() && !self.cross_partition {
            return Err(StoreError::CrossPartitionDisabled);
        }
        Ok(())
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts or overwrites the document with the same `id`.
    async fn upsert(&self, document: &Value) -> Result<Value, StoreError>;

    async fn read(&self, id: &str, partition_key: &str) -> Result<Option<Value>, StoreError>;

    /// Overwrites an existing document; fails with `NotFound` if absent.
    async fn replace(
        &self,
        id: &str,
        partition_key: &str,
        document: &Value,
    ) -> Result<Value, StoreError>;

    async fn query(&self, query: &DocumentQuery) -> Result<Vec<Value>, StoreError>;
}

/// Pulls `(id, partition_key)` out of a document.
pub fn document_keys<'a>(
    document: &'a Value,
    partition_key_path: &'static str,
) -> Result<(&'a str, &'a str), StoreError> {
    let id = document
        .get("id")
        .and_then(Value::as_str)
        .ok_or(StoreError::MissingKey("id"))?;
    let partition_key = document
        .get(partition_key_path)
        .and_then(Value::as_str)
        .ok_or(StoreError::MissingKey(partition_key_path))?;
    Ok((id, partition_key))
}

pub struct PgDocumentStore {
    pool: PgPool,
    table: String,
    partition_key_path: &'static str,
}

impl PgDocumentStore {
    /// Binds to an existing container table. Fails if it is missing.
    pub async fn connect(
        pool: PgPool,
        container: &str,
        partition_key_path: &'static str,
    ) -> Result<Self, StoreError> {
        if !is_valid_identifier(container) {
            return Err(StoreError::InvalidContainer(container.to_string()));
        }

        let found: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
            .bind(container)
            .fetch_one(&pool)
            .await?;
        if found.is_none() {
            return Err(StoreError::ContainerNotFound(container.to_string()));
        }

        info!("Document store bound to container '{container}'");
        Ok(Self {
            pool,
            table: container.to_string(),
            partition_key_path,
        })
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn upsert(&self, document: &Value) -> Result<Value, StoreError> {
        let (id, partition_key) = document_keys(document, self.partition_key_path)?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {} (id, partition_key, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET partition_key = EXCLUDED.partition_key, body = EXCLUDED.body
            "#,
            self.table
        ))
        .bind(id)
        .bind(partition_key)
        .bind(Json(document))
        .execute(&self.pool)
        .await?;

        Ok(document.clone())
    }

    async fn read(&self, id: &str, partition_key: &str) -> Result<Option<Value>, StoreError> {
        let body: Option<Json<Value>> = sqlx::query_scalar(&format!(
            "SELECT body FROM {} WHERE id = $1 AND partition_key = $2",
            self.table
        ))
        .bind(id)
        .bind(partition_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(body.map(|Json(value)| value))
    }

    async fn replace(
        &self,
        id: &str,
        partition_key: &str,
        document: &Value,
    ) -> Result<Value, StoreError> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET body = $3 WHERE id = $1 AND partition_key = $2",
            self.table
        ))
        .bind(id)
        .bind(partition_key)
        .bind(Json(document))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                id: id.to_string(),
                partition_key: partition_key.to_string(),
            });
        }
        Ok(document.clone())
    }

    async fn query(&self, query: &DocumentQuery) -> Result<Vec<Value>, StoreError> {
        query.check_scope()?;
        let filter = Value::Object(query.filter.clone());

        let rows: Vec<Json<Value>> = match &query.partition_key {
            Some(partition_key) => {
                sqlx::query_scalar(&format!(
                    "SELECT body FROM {} WHERE partition_key = $1 AND body @> $2 ORDER BY created_at, id",
                    self.table
                ))
                .bind(partition_key)
                .bind(Json(&filter))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(&format!(
                    "SELECT body FROM {} WHERE body @> $1 ORDER BY created_at, id",
                    self.table
                ))
                .bind(Json(&filter))
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(|Json(value)| value).collect())
    }
}

/// Container names are spliced into SQL, so only plain identifiers pass.
fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
