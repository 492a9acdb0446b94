//! Offline layout analysis for development: PDF text via `pdf-extract`,
//! DOCX text via the crate's own docx reader. No page geometry, only text.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::analysis::{AnalysisError, AnalyzedDocument, LayoutAnalyzer};
use crate::docx::DocxDocument;

const PDF_MAGIC: &[u8] = b"%PDF";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalAnalyzer;

#[async_trait]
impl LayoutAnalyzer for LocalAnalyzer {
    async fn analyze(&self, content: Bytes) -> Result<AnalyzedDocument, AnalysisError> {
        // pdf-extract is CPU-bound and synchronous
        tokio::task::spawn_blocking(move || extract(&content))
            .await
            .map_err(|e| AnalysisError::Failed(format!("extraction task aborted: {e}")))?
    }
}

fn extract(content: &[u8]) -> Result<AnalyzedDocument, AnalysisError> {
    let text = if content.starts_with(PDF_MAGIC) {
        pdf_extract::extract_text_from_mem(content).map_err(|e| AnalysisError::Pdf(e.to_string()))?
    } else if content.starts_with(ZIP_MAGIC) {
        DocxDocument::load(content)?.plain_text()?
    } else {
        let head: String = content
            .iter()
            .take(8)
            .map(|b| format!("{b:02x}"))
            .collect();
        return Err(AnalysisError::UnsupportedFormat(format!(
            "unrecognised leading bytes {head}"
        )));
    };

    let document = AnalyzedDocument::from_text(&text);
    debug!("Local analysis produced {} pages", document.pages.len());
    Ok(document)
}
