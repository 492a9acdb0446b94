/// LLM Client: the single point of entry for all completion API calls.
///
/// ARCHITECTURAL RULE: No other module may call the completion endpoint directly.
/// Services depend on the `CompletionApi` trait; `LlmClient` is the production
/// implementation (Azure OpenAI chat completions).
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::retry::{retry_rate_limited, BackoffPolicy, Retryable};

pub mod prompts;
pub mod structured;

pub const DEFAULT_API_VERSION: &str = "2024-02-15-preview";
/// Token budget for every completion.
pub const MAX_TOKENS: u32 = 4000;
/// Fixed seed so repeated runs over the same RFP stay as deterministic as the API allows.
pub const SEED: u64 = 42;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl Retryable for LlmError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, LlmError::Api { status: 429, .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One outbound completion call: role-tagged messages plus token budget and seed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub seed: u64,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: MAX_TOKENS,
            seed: SEED,
        }
    }
}

/// Anything that can turn a `CompletionRequest` into raw completion text.
#[async_trait]
pub trait CompletionApi: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content of the first choice.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AzureError {
    error: AzureErrorBody,
}

#[derive(Debug, Deserialize)]
struct AzureErrorBody {
    message: String,
}

/// The completion client shared by extraction and matching.
/// Created once at startup and handed to services by reference.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    url: String,
    api_key: String,
    backoff: BackoffPolicy,
}

impl LlmClient {
    pub fn new(
        endpoint: &str,
        deployment: &str,
        api_version: &str,
        api_key: String,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            url: completions_url(endpoint, deployment, api_version),
            api_key,
            backoff: BackoffPolicy::RATE_LIMIT,
        })
    }

    #[cfg(test)]
    fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Makes a single HTTP call, returning the full response object.
    async fn send(&self, request: &CompletionRequest) -> Result<LlmResponse, LlmError> {
        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                warn!("Completion API returned {}: {}", status, body);
            }
            let message = serde_json::from_str::<AzureError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let llm_response: LlmResponse = response.json().await?;
        if let Some(usage) = &llm_response.usage {
            debug!(
                "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }
        Ok(llm_response)
    }
}

#[async_trait]
impl CompletionApi for LlmClient {
    /// Retries on 429 with the shared exponential backoff; any other HTTP
    /// failure is returned immediately.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let response =
            retry_rate_limited(self.backoff, "completion API", || self.send(request)).await?;
        response
            .text()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(LlmError::EmptyContent)
    }
}

fn completions_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        api_version
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{extract::State, Json, Router};
    use serde_json::{json, Value};

    use crate::extraction::requirements::extract_requirements;

    #[test]
    fn test_completions_url_trims_trailing_slash() {
        assert_eq!(
            completions_url("https://rfp.openai.azure.com/", "gpt-4o", DEFAULT_API_VERSION),
            "https://rfp.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-15-preview"
        );
    }

    #[test]
    fn test_request_serializes_with_budget_and_seed() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("be precise"),
            ChatMessage::user("extract"),
        ]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["max_tokens"], 4000);
        assert_eq!(json["seed"], 42);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "extract");
    }

    #[test]
    fn test_response_text_takes_first_choice() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "```json\n[]\n```"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        }"#;
        let response: LlmResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.text(), Some("```json\n[]\n```"));
    }

    #[test]
    fn test_only_429_is_rate_limited() {
        let throttled = LlmError::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        let denied = LlmError::Api {
            status: 401,
            message: "bad key".to_string(),
        };
        assert!(throttled.is_rate_limited());
        assert!(!denied.is_rate_limited());
        assert!(!LlmError::EmptyContent.is_rate_limited());
    }

    #[derive(Clone, Copy)]
    enum Scenario {
        ThrottleTwice,
        Unauthorized,
        ContentFiltered,
    }

    #[derive(Clone)]
    struct FakeAzure {
        calls: Arc<AtomicU32>,
        scenario: Scenario,
    }

    async fn chat(
        State(svc): State<FakeAzure>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let call = svc.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(headers["api-key"], "secret");
        assert_eq!(body["seed"], 42);

        match svc.scenario {
            Scenario::ThrottleTwice if call < 2 => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": {"code": "429", "message": "Rate limit exceeded"}})),
            ),
            Scenario::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": {"code": "401", "message": "Access denied due to invalid subscription key"}})),
            ),
            Scenario::ContentFiltered => (
                StatusCode::OK,
                Json(json!({
                    "choices": [{"message": {"role": "assistant", "content": null}, "finish_reason": "content_filter"}]
                })),
            ),
            Scenario::ThrottleTwice => (
                StatusCode::OK,
                Json(json!({
                    "choices": [{"message": {"role": "assistant", "content": "```json\n[]\n```"}}],
                    "usage": {"prompt_tokens": 12, "completion_tokens": 4}
                })),
            ),
        }
    }

    async fn spawn_service(scenario: Scenario) -> (LlmClient, Arc<AtomicU32>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let calls = Arc::new(AtomicU32::new(0));
        let app = Router::new()
            .route("/openai/deployments/gpt-test/chat/completions", post(chat))
            .with_state(FakeAzure {
                calls: calls.clone(),
                scenario,
            });
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let client = LlmClient::new(&base, "gpt-test", DEFAULT_API_VERSION, "secret".to_string())
            .unwrap()
            .with_backoff(BackoffPolicy {
                max_attempts: 5,
                base_secs: 1,
            });
        (client, calls)
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::user("extract")])
    }

    #[tokio::test]
    async fn test_throttled_completion_is_retried() {
        let (client, calls) = spawn_service(Scenario::ThrottleTwice).await;
        let text = client.complete(&request()).await.unwrap();
        assert_eq!(text, "```json\n[]\n```");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_is_returned_at_once() {
        let (client, calls) = spawn_service(Scenario::Unauthorized).await;
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::Api { status: 401, ref message } if message.starts_with("Access denied")
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_content_filtered_reply_is_empty_content() {
        let (client, calls) = spawn_service(Scenario::ContentFiltered).await;
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyContent));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_content_filtered_extraction_comes_back_empty() {
        let (client, calls) = spawn_service(Scenario::ContentFiltered).await;
        let roles = extract_requirements(&client, "RFP page text", "doc.pdf")
            .await
            .unwrap();
        assert!(roles.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
