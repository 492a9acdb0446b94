use tracing::{debug, info, warn};

use crate::analysis::AnalyzedDocument;
use crate::config::ExtractionMode;
use crate::errors::AppError;
use crate::extraction::prompts::{
    REQUIREMENTS_RESPONSE_SHAPE, REQUIREMENTS_SYSTEM, REQUIREMENTS_USER,
};
use crate::llm_client::structured::{
    complete_structured, ExtractionRequest, OneOrMany, StructuredError, StructuredPrompt,
};
use crate::llm_client::CompletionApi;
use crate::models::extract::RoleRequirement;

pub fn requirements_prompt(text: &str) -> StructuredPrompt {
    StructuredPrompt::new("requirement extraction", REQUIREMENTS_RESPONSE_SHAPE)
        .message(ExtractionRequest::system(REQUIREMENTS_SYSTEM))
        .message(ExtractionRequest::user(REQUIREMENTS_USER).bind("document_text", text))
}

/// Extracts role requirements from one unit of text (a document or a page window).
///
/// A reply that stays unparseable after every repair yields an empty list;
/// only completion API failures are errors.
pub async fn extract_requirements(
    llm: &dyn CompletionApi,
    text: &str,
    unit: &str,
) -> Result<Vec<RoleRequirement>, AppError> {
    if text.trim().is_empty() {
        debug!("{unit}: no text, skipping extraction");
        return Ok(Vec::new());
    }

    match complete_structured::<OneOrMany<RoleRequirement>>(llm, &requirements_prompt(text)).await {
        Ok(roles) => {
            let roles = roles.into_vec();
            info!("{unit}: extracted {} roles", roles.len());
            Ok(roles)
        }
        Err(e @ StructuredError::ExtractionFailed { .. }) => {
            warn!("{unit}: no requirements extracted: {e}");
            Ok(Vec::new())
        }
        Err(StructuredError::Completion(e)) => Err(AppError::Llm(format!(
            "Requirement extraction for {unit} failed: {e}"
        ))),
    }
}

/// Previous page's text followed by the current page's, once per page.
/// The first window holds the first page alone.
pub fn page_windows(document: &AnalyzedDocument) -> Vec<(u32, String)> {
    let mut previous = String::new();
    document
        .pages
        .iter()
        .map(|page| {
            let current = page.text();
            let window = format!("{previous}{current}");
            previous = current;
            (page.page_number, window)
        })
        .collect()
}

/// Runs extraction over an analyzed document in the configured mode.
/// Results keep document order; duplicates are left to the run ledger.
pub async fn extract_from_document(
    llm: &dyn CompletionApi,
    document: &AnalyzedDocument,
    mode: ExtractionMode,
    blob_name: &str,
) -> Result<Vec<RoleRequirement>, AppError> {
    match mode {
        ExtractionMode::Document => extract_requirements(llm, &document.content, blob_name).await,
        ExtractionMode::PageWindow => {
            let mut roles = Vec::new();
            for (page_number, window) in page_windows(document) {
                let unit = format!("{blob_name} page {page_number}");
                roles.extend(extract_requirements(llm, &window, &unit).await?);
            }
            Ok(roles)
        }
    }
}
