mod analysis;
mod config;
mod db;
mod docx;
mod errors;
mod extraction;
mod llm_client;
mod matching;
mod models;
mod resume;
mod retry;
mod routes;
mod state;
mod storage;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::document_intelligence::DocumentIntelligenceClient;
use crate::analysis::local::LocalAnalyzer;
use crate::analysis::LayoutAnalyzer;
use crate::config::{AnalysisBackend, Config};
use crate::db::connect_document_store;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::blobs::S3BlobStore;
use crate::storage::repository::StaffingRepository;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting staffing service v{}", env!("CARGO_PKG_VERSION"));

    // Document store: the container must already exist
    let documents =
        connect_document_store(&config.database_url, &config.document_store_container).await?;
    let repository = StaffingRepository::new(Arc::new(documents));

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    let blobs = Arc::new(S3BlobStore::new(s3, config.s3_bucket.clone()));
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    // Initialize LLM client
    let llm = LlmClient::new(
        &config.openai_endpoint,
        &config.openai_deployment,
        &config.openai_api_version,
        config.openai_api_key.clone(),
    )?;
    info!(
        "LLM client initialized (deployment: {})",
        config.openai_deployment
    );

    let analyzer: Arc<dyn LayoutAnalyzer> = match &config.analysis_backend {
        AnalysisBackend::DocumentIntelligence { endpoint, api_key } => {
            info!("Layout analysis: Document Intelligence at {endpoint}");
            Arc::new(DocumentIntelligenceClient::new(endpoint, api_key.clone())?)
        }
        AnalysisBackend::Local => {
            info!("Layout analysis: local text extraction");
            Arc::new(LocalAnalyzer)
        }
    };
    info!("Extraction mode: {:?}", config.extraction_mode);

    // Build app state
    let state = AppState {
        llm: Arc::new(llm),
        analyzer,
        blobs,
        repository,
        config: config.clone(),
        run_lock: Arc::new(Mutex::new(())),
    };

    // Build router
    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "staffing-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(config.s3_region.clone()))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}
