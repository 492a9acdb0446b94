use std::sync::Arc;

use tokio::sync::Mutex;

use crate::analysis::LayoutAnalyzer;
use crate::config::Config;
use crate::extraction::ingest::IngestionContext;
use crate::llm_client::CompletionApi;
use crate::retry::BackoffPolicy;
use crate::storage::blobs::BlobStore;
use crate::storage::repository::StaffingRepository;

/// Shared application state injected into all route handlers via Axum extractors.
/// Every collaborator is built once in `main` and shared by reference.
#[derive(Clone)]
pub struct AppState {
    /// Completion API. Default: `LlmClient` (Azure OpenAI).
    pub llm: Arc<dyn CompletionApi>,
    /// Layout analysis backend, chosen by ANALYSIS_BACKEND.
    pub analyzer: Arc<dyn LayoutAnalyzer>,
    pub blobs: Arc<dyn BlobStore>,
    pub repository: StaffingRepository,
    pub config: Config,
    /// Held for the whole of an ingestion or résumé run, so runs never overlap.
    pub run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn ingestion_context(&self) -> IngestionContext<'_> {
        IngestionContext {
            llm: self.llm.as_ref(),
            analyzer: self.analyzer.as_ref(),
            blobs: self.blobs.as_ref(),
            repository: &self.repository,
            mode: self.config.extraction_mode,
            backoff: BackoffPolicy::RATE_LIMIT,
        }
    }
}
