use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::extraction::ingest::{run_ingestion, IngestionReport};
use crate::models::extract::{
    StaffingExtractRecord, PARTITION_KEY_FIELD, STATUS_RESUME_CREATED, STATUS_RFP_EXTRACTED,
};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct IngestionRequest {
    /// Overrides the configured storage folder.
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct FieldUpdate {
    pub field: String,
    pub value: Value,
}

/// POST /api/v1/ingestions
pub async fn handle_ingest(
    State(state): State<AppState>,
    body: Option<Json<IngestionRequest>>,
) -> Result<Json<IngestionReport>, AppError> {
    let prefix = body
        .and_then(|Json(req)| req.prefix)
        .unwrap_or_else(|| state.config.storage_folder.clone());

    let _run = state.run_lock.lock().await;
    let report = run_ingestion(&state.ingestion_context(), &prefix).await?;
    Ok(Json(report))
}

/// GET /api/v1/extracts/:rfp_id
pub async fn handle_list_run(
    State(state): State<AppState>,
    Path(rfp_id): Path<Uuid>,
) -> Result<Json<Vec<StaffingExtractRecord>>, AppError> {
    Ok(Json(state.repository.list_run(rfp_id).await?))
}

/// GET /api/v1/extracts/:rfp_id/:id
pub async fn handle_get_extract(
    State(state): State<AppState>,
    Path((rfp_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<StaffingExtractRecord>, AppError> {
    state
        .repository
        .get_extract(rfp_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Extract {id} not found in run {rfp_id}")))
}

/// PATCH /api/v1/extracts/:rfp_id/:id/status
pub async fn handle_update_status(
    State(state): State<AppState>,
    Path((rfp_id, id)): Path<(Uuid, Uuid)>,
    Json(req): Json<StatusUpdate>,
) -> Result<Json<Value>, AppError> {
    if ![STATUS_RFP_EXTRACTED, STATUS_RESUME_CREATED].contains(&req.status.as_str()) {
        return Err(AppError::Validation(format!(
            "Unknown status '{}'",
            req.status
        )));
    }
    let updated = state.repository.update_status(rfp_id, id, &req.status).await?;
    info!("Extract {id} moved to '{}'", req.status);
    Ok(Json(updated))
}

/// PATCH /api/v1/extracts/:rfp_id/:id
/// Overwrites any top-level field except the record's keys.
pub async fn handle_update_field(
    State(state): State<AppState>,
    Path((rfp_id, id)): Path<(Uuid, Uuid)>,
    Json(req): Json<FieldUpdate>,
) -> Result<Json<Value>, AppError> {
    if req.field.is_empty() || req.field == "id" || req.field == PARTITION_KEY_FIELD {
        return Err(AppError::Validation(format!(
            "Field '{}' cannot be updated",
            req.field
        )));
    }
    let updated = state
        .repository
        .update_field(rfp_id, id, &req.field, req.value)
        .await?;
    Ok(Json(updated))
}
