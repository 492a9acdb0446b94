//! Layout analysis: raw document bytes in, page/line text out.

pub mod document_intelligence;
pub mod local;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::docx::TemplateError;
use crate::retry::Retryable;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Layout analysis rate limited: {0}")]
    RateLimited(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Layout analysis API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Analysis submission returned no Operation-Location header")]
    MissingOperationLocation,

    #[error("Layout analysis failed: {0}")]
    Failed(String),

    #[error("Layout analysis still running after {polls} polls")]
    TimedOut { polls: u32 },

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("PDF text extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX text extraction failed: {0}")]
    Docx(#[from] TemplateError),
}

impl Retryable for AnalysisError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, AnalysisError::RateLimited(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalyzedPage {
    pub page_number: u32,
    pub lines: Vec<String>,
}

impl AnalyzedPage {
    /// Each line followed by a newline.
    pub fn text(&self) -> String {
        self.lines.iter().fold(String::new(), |mut text, line| {
            text.push_str(line);
            text.push('\n');
            text
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalyzedDocument {
    /// The whole document as one flattened string.
    pub content: String,
    pub pages: Vec<AnalyzedPage>,
}

impl AnalyzedDocument {
    /// Builds pages from plain text: pages split on form feed, blank lines dropped.
    pub fn from_text(text: &str) -> Self {
        let pages = text
            .split('\u{c}')
            .enumerate()
            .map(|(index, page)| AnalyzedPage {
                page_number: index as u32 + 1,
                lines: page
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(String::from)
                    .collect(),
            })
            .filter(|page| !page.lines.is_empty())
            .collect();
        Self {
            content: text.replace('\u{c}', "\n").trim().to_string(),
            pages,
        }
    }
}

#[async_trait]
pub trait LayoutAnalyzer: Send + Sync {
    async fn analyze(&self, content: Bytes) -> Result<AnalyzedDocument, AnalysisError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_split_on_form_feed() {
        let doc = AnalyzedDocument::from_text("SECTION C\n  Key Personnel \n\n\u{c}Program Manager\n\u{c}\n");
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[0].page_number, 1);
        assert_eq!(doc.pages[0].lines, vec!["SECTION C", "Key Personnel"]);
        assert_eq!(doc.pages[1].page_number, 2);
        assert_eq!(doc.pages[1].text(), "Program Manager\n");
        assert!(!doc.content.contains('\u{c}'));
    }

    #[test]
    fn test_page_text_terminates_every_line() {
        let page = AnalyzedPage {
            page_number: 3,
            lines: vec!["a".into(), "b".into()],
        };
        assert_eq!(page.text(), "a\nb\n");
        assert_eq!(AnalyzedPage::default().text(), "");
    }

    #[test]
    fn test_only_rate_limit_is_retryable() {
        assert!(AnalysisError::RateLimited("429".into()).is_rate_limited());
        assert!(!AnalysisError::Failed("bad input".into()).is_rate_limited());
        assert!(!AnalysisError::Api {
            status: 500,
            message: "boom".into()
        }
        .is_rate_limited());
    }
}
