use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use crate::llm_client::DEFAULT_API_VERSION;

/// How a document's analyzed text is fed to requirement extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// The whole document content in one call.
    Document,
    /// One call per page, each carrying the previous page's text too.
    PageWindow,
}

impl FromStr for ExtractionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document" => Ok(Self::Document),
            "page_window" => Ok(Self::PageWindow),
            other => Err(anyhow!(
                "EXTRACTION_MODE must be 'document' or 'page_window', got '{other}'"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisBackend {
    DocumentIntelligence { endpoint: String, api_key: String },
    Local,
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_endpoint: String,
    pub openai_api_key: String,
    pub openai_deployment: String,
    pub openai_api_version: String,
    pub s3_endpoint: String,
    pub s3_bucket: String,
    pub s3_region: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    /// Blob name prefix listed by ingestion runs.
    pub storage_folder: String,
    pub database_url: String,
    pub document_store_container: String,
    pub analysis_backend: AnalysisBackend,
    pub extraction_mode: ExtractionMode,
    pub output_folder: String,
    pub resume_template_blob: String,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            openai_endpoint: require_env("AZURE_OPENAI_ENDPOINT")?,
            openai_api_key: require_env("AZURE_OPENAI_API_KEY")?,
            openai_deployment: require_env("AZURE_OPENAI_DEPLOYMENT_NAME")?,
            openai_api_version: env_or("AZURE_OPENAI_API_VERSION", DEFAULT_API_VERSION),
            s3_endpoint: require_env("S3_ENDPOINT")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_region: env_or("S3_REGION", "us-east-1"),
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            storage_folder: env_or("STORAGE_FOLDER", ""),
            database_url: require_env("DATABASE_URL")?,
            document_store_container: require_env("DOCUMENT_STORE_CONTAINER")?,
            analysis_backend: analysis_backend()?,
            extraction_mode: env_or("EXTRACTION_MODE", "document").parse()?,
            output_folder: env_or("OUTPUT_FOLDER", "output"),
            resume_template_blob: require_env("RESUME_TEMPLATE_BLOB")?,
            port: env_or("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }
}

fn analysis_backend() -> Result<AnalysisBackend> {
    match env_or("ANALYSIS_BACKEND", "document_intelligence").as_str() {
        "document_intelligence" => Ok(AnalysisBackend::DocumentIntelligence {
            endpoint: require_env("DOCUMENT_INTELLIGENCE_ENDPOINT")?,
            api_key: require_env("DOCUMENT_INTELLIGENCE_KEY")?,
        }),
        "local" => Ok(AnalysisBackend::Local),
        other => Err(anyhow!(
            "ANALYSIS_BACKEND must be 'document_intelligence' or 'local', got '{other}'"
        )),
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
