//! Document ingestion driver: one run over a list of source blobs.
//!
//! Documents are processed one at a time, in the order given. Each document
//! is downloaded, analyzed (rate limits retried with backoff), mined for role
//! requirements, and written as its own record. A fatal error aborts the run
//! but leaves records already written in place.

use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::LayoutAnalyzer;
use crate::config::ExtractionMode;
use crate::errors::AppError;
use crate::extraction::dedup::RoleLedger;
use crate::extraction::requirements::extract_from_document;
use crate::llm_client::CompletionApi;
use crate::models::extract::{RoleRequirement, StaffingExtractRecord};
use crate::retry::{retry_rate_limited, BackoffPolicy};
use crate::storage::blobs::BlobStore;
use crate::storage::repository::StaffingRepository;

/// File extensions ingestion accepts (compared case-insensitively).
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "docx"];

/// Collaborators of one ingestion run, borrowed for its duration.
pub struct IngestionContext<'a> {
    pub llm: &'a dyn CompletionApi,
    pub analyzer: &'a dyn LayoutAnalyzer,
    pub blobs: &'a dyn BlobStore,
    pub repository: &'a StaffingRepository,
    pub mode: ExtractionMode,
    pub backoff: BackoffPolicy,
}

#[derive(Debug, Serialize)]
pub struct IngestionReport {
    pub rfp_id: Uuid,
    /// Ids of the records written, in document order.
    pub records: Vec<Uuid>,
    /// Blobs skipped for their extension.
    pub skipped: Vec<String>,
    /// Blobs analyzed that yielded no requirements.
    pub empty: Vec<String>,
    /// Distinct roles of the run, first occurrence kept.
    pub roles: Vec<RoleRequirement>,
}

pub fn has_allowed_extension(blob_name: &str) -> bool {
    Path::new(blob_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

/// Ingests every blob listed under `prefix`.
pub async fn run_ingestion(
    ctx: &IngestionContext<'_>,
    prefix: &str,
) -> Result<IngestionReport, AppError> {
    let blob_names = ctx.blobs.list(prefix).await?;
    info!("Found {} blobs under '{}'", blob_names.len(), prefix);
    ingest_documents(ctx, &blob_names).await
}

pub async fn ingest_documents(
    ctx: &IngestionContext<'_>,
    blob_names: &[String],
) -> Result<IngestionReport, AppError> {
    let rfp_id = Uuid::new_v4();
    info!("Starting ingestion run {rfp_id} over {} blobs", blob_names.len());

    let mut ledger = RoleLedger::default();
    let mut report = IngestionReport {
        rfp_id,
        records: Vec::new(),
        skipped: Vec::new(),
        empty: Vec::new(),
        roles: Vec::new(),
    };

    for blob_name in blob_names {
        if !has_allowed_extension(blob_name) {
            info!("Skipping '{blob_name}': unsupported file type");
            report.skipped.push(blob_name.clone());
            continue;
        }

        info!("Processing '{blob_name}'");
        let content = ctx.blobs.download(blob_name).await?;
        let document = retry_rate_limited(ctx.backoff, blob_name, || {
            ctx.analyzer.analyze(content.clone())
        })
        .await?;

        let extracted = extract_from_document(ctx.llm, &document, ctx.mode, blob_name).await?;
        if extracted.is_empty() {
            warn!("No staffing requirements found in '{blob_name}'");
            report.empty.push(blob_name.clone());
            continue;
        }

        let admitted = ledger.admit(extracted);
        let record = StaffingExtractRecord::new(rfp_id, blob_name, admitted);
        ctx.repository.insert_extract(&record).await?;
        report.records.push(record.id);
    }

    report.roles = ledger.into_roles();
    info!(
        "Ingestion run {rfp_id} finished: {} records, {} roles, {} skipped, {} empty",
        report.records.len(),
        report.roles.len(),
        report.skipped.len(),
        report.empty.len()
    );
    Ok(report)
}
