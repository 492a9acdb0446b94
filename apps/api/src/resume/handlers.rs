use std::path::Path;

use axum::{extract::State, Json};

use crate::errors::AppError;
use crate::resume::assembly::{run_resume_generation, ResumeContext, ResumeReport};
use crate::state::AppState;

/// POST /api/v1/resumes
/// Matches candidates and writes résumés for every run still in `rfp_extracted`.
pub async fn handle_generate_resumes(
    State(state): State<AppState>,
) -> Result<Json<ResumeReport>, AppError> {
    let _run = state.run_lock.lock().await;
    let ctx = ResumeContext {
        llm: state.llm.as_ref(),
        blobs: state.blobs.as_ref(),
        repository: &state.repository,
        template_blob: &state.config.resume_template_blob,
        output_dir: Path::new(&state.config.output_folder),
        output_blob_folder: &state.config.output_folder,
    };
    let report = run_resume_generation(&ctx).await?;
    Ok(Json(report))
}
