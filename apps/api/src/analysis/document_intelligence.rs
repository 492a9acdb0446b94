//! Azure Document Intelligence client (`prebuilt-layout` model, REST API).
//!
//! Analysis is asynchronous on the service side: the document is submitted,
//! the response carries an `Operation-Location` URL, and that URL is polled
//! until the operation settles.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use crate::analysis::{AnalysisError, AnalyzedDocument, AnalyzedPage, LayoutAnalyzer};

const API_VERSION: &str = "2023-07-31";
const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_POLLS: u32 = 300;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeOperation {
    status: String,
    analyze_result: Option<AnalyzeResult>,
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResult {
    #[serde(default)]
    content: String,
    #[serde(default)]
    pages: Vec<ResultPage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultPage {
    page_number: u32,
    #[serde(default)]
    lines: Vec<ResultLine>,
}

#[derive(Debug, Deserialize)]
struct ResultLine {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ServiceError,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl From<AnalyzeResult> for AnalyzedDocument {
    fn from(result: AnalyzeResult) -> Self {
        AnalyzedDocument {
            content: result.content,
            pages: result
                .pages
                .into_iter()
                .map(|page| AnalyzedPage {
                    page_number: page.page_number,
                    lines: page.lines.into_iter().map(|line| line.content).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Clone)]
pub struct DocumentIntelligenceClient {
    client: Client,
    endpoint: String,
    api_key: String,
    poll_interval: Duration,
}

impl DocumentIntelligenceClient {
    pub fn new(endpoint: &str, api_key: String) -> Result<Self, AnalysisError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            poll_interval: POLL_INTERVAL,
        })
    }

    #[cfg(test)]
    fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/formrecognizer/documentModels/prebuilt-layout:analyze?api-version={}",
            self.endpoint, API_VERSION
        )
    }

    /// Submits the document and returns the operation URL to poll.
    async fn submit(&self, content: Bytes) -> Result<String, AnalysisError> {
        let response = self
            .client
            .post(self.analyze_url())
            .header(KEY_HEADER, &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(content)
            .send()
            .await?;
        let response = check_status(response).await?;

        response
            .headers()
            .get("operation-location")
            .and_then(|value| value.to_str().ok())
            .map(String::from)
            .ok_or(AnalysisError::MissingOperationLocation)
    }

    async fn wait_for(&self, operation_url: &str) -> Result<AnalyzeResult, AnalysisError> {
        for poll in 1..=MAX_POLLS {
            let response = self
                .client
                .get(operation_url)
                .header(KEY_HEADER, &self.api_key)
                .send()
                .await?;
            let operation: AnalyzeOperation = check_status(response).await?.json().await?;

            match operation.status.as_str() {
                "succeeded" => {
                    return operation.analyze_result.ok_or_else(|| {
                        AnalysisError::Failed("operation succeeded without a result".to_string())
                    })
                }
                "failed" => {
                    let reason = operation
                        .error
                        .map(|e| format!("{}: {}", e.code, e.message))
                        .unwrap_or_else(|| "no error details".to_string());
                    return Err(AnalysisError::Failed(reason));
                }
                status => {
                    debug!("Analysis operation {status} (poll {poll})");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        Err(AnalysisError::TimedOut { polls: MAX_POLLS })
    }
}

#[async_trait]
impl LayoutAnalyzer for DocumentIntelligenceClient {
    async fn analyze(&self, content: Bytes) -> Result<AnalyzedDocument, AnalysisError> {
        let size = content.len();
        let operation_url = self.submit(content).await?;
        let result = self.wait_for(&operation_url).await?;
        info!(
            "Layout analysis done: {} bytes in, {} pages out",
            size,
            result.pages.len()
        );
        Ok(result.into())
    }
}

/// 429 becomes `RateLimited`; any other non-2xx is a fatal `Api` error.
async fn check_status(response: Response) -> Result<Response, AnalysisError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AnalysisError::RateLimited(message));
    }
    Err(AnalysisError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{extract::State, Json, Router};
    use serde_json::json;

    const RESULT: &str = r#"{
        "status": "succeeded",
        "analyzeResult": {
            "content": "Program Manager\nTen years experience",
            "pages": [
                {"pageNumber": 1, "lines": [{"content": "Program Manager", "polygon": [0, 0]}]},
                {"pageNumber": 2, "lines": [{"content": "Ten years experience"}]}
            ]
        }
    }"#;

    #[test]
    fn test_result_maps_to_analyzed_document() {
        let operation: AnalyzeOperation = serde_json::from_str(RESULT).unwrap();
        let doc: AnalyzedDocument = operation.analyze_result.unwrap().into();
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[0].text(), "Program Manager\n");
        assert_eq!(doc.pages[1].page_number, 2);
        assert!(doc.content.starts_with("Program Manager"));
    }

    #[derive(Clone)]
    struct FakeService {
        base: String,
        polls: Arc<AtomicU32>,
        throttle: bool,
    }

    async fn submit(State(svc): State<FakeService>, headers: HeaderMap) -> impl IntoResponse {
        if svc.throttle {
            return (
                AxumStatus::TOO_MANY_REQUESTS,
                [("operation-location", String::new())],
                Json(json!({"error": {"code": "429", "message": "Rate limit exceeded"}})),
            );
        }
        assert_eq!(headers[KEY_HEADER], "secret");
        (
            AxumStatus::ACCEPTED,
            [("operation-location", format!("{}/operations/1", svc.base))],
            Json(json!({})),
        )
    }

    async fn operation(State(svc): State<FakeService>) -> Json<serde_json::Value> {
        if svc.polls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Json(json!({"status": "running"}));
        }
        Json(serde_json::from_str(RESULT).unwrap())
    }

    async fn spawn_service(throttle: bool) -> (DocumentIntelligenceClient, Arc<AtomicU32>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let polls = Arc::new(AtomicU32::new(0));
        let svc = FakeService {
            base: base.clone(),
            polls: polls.clone(),
            throttle,
        };
        let app = Router::new()
            .route(
                "/formrecognizer/documentModels/prebuilt-layout:analyze",
                post(submit),
            )
            .route("/operations/1", get(operation))
            .with_state(svc);
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let client = DocumentIntelligenceClient::new(&base, "secret".to_string())
            .unwrap()
            .with_poll_interval(Duration::from_millis(5));
        (client, polls)
    }

    #[tokio::test]
    async fn test_submit_then_poll_until_succeeded() {
        let (client, polls) = spawn_service(false).await;
        let doc = client.analyze(Bytes::from_static(b"%PDF-1.7")).await.unwrap();
        assert_eq!(polls.load(Ordering::SeqCst), 2);
        assert_eq!(doc.pages[0].lines, vec!["Program Manager"]);
    }

    #[tokio::test]
    async fn test_throttled_submission_is_rate_limited_error() {
        let (client, polls) = spawn_service(true).await;
        let err = client.analyze(Bytes::from_static(b"%PDF")).await.unwrap_err();
        assert!(matches!(err, AnalysisError::RateLimited(ref m) if m == "Rate limit exceeded"));
        assert_eq!(polls.load(Ordering::SeqCst), 0);
    }
}
