//! Scripted collaborators for service tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::analysis::{AnalysisError, AnalyzedDocument, LayoutAnalyzer};
use crate::config::{AnalysisBackend, Config, ExtractionMode};
use crate::llm_client::{CompletionApi, CompletionRequest, LlmError};

/// Replays canned completions in order and records every request it got.
#[derive(Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new<'a>(replies: impl IntoIterator<Item = &'a str>) -> Self {
        Self::from_results(replies.into_iter().map(|r| Ok(r.to_string())))
    }

    pub fn failing(error: LlmError) -> Self {
        Self::from_results([Err(error)])
    }

    /// Replies and API errors, in the order they are handed out.
    pub fn from_results(results: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(results.into_iter().collect()),
            requests: Mutex::default(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionApi for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(LlmError::Api {
                    status: 500,
                    message: "script exhausted".to_string(),
                })
            })
    }
}

/// Treats the document bytes as UTF-8 text, form feeds separating pages.
/// Bytes starting with `THROTTLE` fail as rate limited, `BROKEN` fatally.
#[derive(Default)]
pub struct FakeAnalyzer {
    calls: Mutex<usize>,
}

impl FakeAnalyzer {
    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl LayoutAnalyzer for FakeAnalyzer {
    async fn analyze(&self, content: Bytes) -> Result<AnalyzedDocument, AnalysisError> {
        *self.calls.lock().unwrap() += 1;
        let text = String::from_utf8_lossy(&content);
        if text.starts_with("THROTTLE") {
            return Err(AnalysisError::RateLimited("429 Too Many Requests".to_string()));
        }
        if text.starts_with("BROKEN") {
            return Err(AnalysisError::Api {
                status: 400,
                message: "InvalidContent".to_string(),
            });
        }
        Ok(AnalyzedDocument::from_text(&text))
    }
}

/// Configuration for in-process tests: local analysis, whole-document extraction.
pub fn test_config() -> Config {
    Config {
        openai_endpoint: "http://localhost:1".to_string(),
        openai_api_key: "test".to_string(),
        openai_deployment: "gpt-test".to_string(),
        openai_api_version: "2024-02-15-preview".to_string(),
        s3_endpoint: "http://localhost:2".to_string(),
        s3_bucket: "rfps".to_string(),
        s3_region: "us-east-1".to_string(),
        aws_access_key_id: "test".to_string(),
        aws_secret_access_key: "test".to_string(),
        storage_folder: "rfp/".to_string(),
        database_url: "postgres://localhost/staffing".to_string(),
        document_store_container: "documents".to_string(),
        analysis_backend: AnalysisBackend::Local,
        extraction_mode: ExtractionMode::Document,
        output_folder: "output".to_string(),
        resume_template_blob: "templates/resume.docx".to_string(),
        port: 8080,
        rust_log: "info".to_string(),
    }
}
