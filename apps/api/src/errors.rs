use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::docx::TemplateError;
use crate::storage::blobs::BlobError;
use crate::storage::documents::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
/// Everything but `NotFound` and `Validation` aborts the run it occurs in.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Document store error: {0}")]
    Store(StoreError),

    #[error("Blob store error: {0}")]
    Blob(BlobError),

    #[error("Layout analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { id, partition_key } => {
                AppError::NotFound(format!("Record {id} not found in partition {partition_key}"))
            }
            other => AppError::Store(other),
        }
    }
}

impl From<BlobError> for AppError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::NotFound(name) => AppError::NotFound(format!("Blob '{name}' not found")),
            other => AppError::Blob(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Store(e) => {
                tracing::error!("Document store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "A document store error occurred".to_string(),
                )
            }
            AppError::Blob(e) => {
                tracing::error!("Blob store error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "BLOB_ERROR",
                    "A blob storage error occurred".to_string(),
                )
            }
            AppError::Analysis(e) => {
                tracing::error!("Layout analysis error: {e}");
                let status = if matches!(e, AnalysisError::RateLimited(_)) {
                    StatusCode::TOO_MANY_REQUESTS
                } else {
                    StatusCode::BAD_GATEWAY
                };
                (status, "ANALYSIS_ERROR", e.to_string())
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                )
            }
            AppError::Template(e) => {
                tracing::error!("Template error: {e}");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "TEMPLATE_ERROR",
                    e.to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
