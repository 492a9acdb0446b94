pub mod health;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::extraction::handlers;
use crate::resume::handlers::handle_generate_resumes;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Ingestion runs
        .route("/api/v1/ingestions", post(handlers::handle_ingest))
        // Extract records
        .route("/api/v1/extracts/:rfp_id", get(handlers::handle_list_run))
        .route(
            "/api/v1/extracts/:rfp_id/:id",
            get(handlers::handle_get_extract).patch(handlers::handle_update_field),
        )
        .route(
            "/api/v1/extracts/:rfp_id/:id/status",
            patch(handlers::handle_update_status),
        )
        // Résumé runs
        .route("/api/v1/resumes", post(handle_generate_resumes))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tokio::sync::Mutex;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::storage::memory::{MemoryBlobStore, MemoryDocumentStore};
    use crate::storage::repository::StaffingRepository;
    use crate::test_support::{test_config, FakeAnalyzer, ScriptedCompletion};

    const ROLE_REPLY: &str = "```json\n[{\"required_role\":\"Program Manager\",\"role_requirements\":[{\"requirement\":\"PMP\"}]}]\n```";

    fn app(replies: &[&'static str]) -> Router {
        let state = AppState {
            llm: Arc::new(ScriptedCompletion::new(replies.iter().copied())),
            analyzer: Arc::new(FakeAnalyzer::default()),
            blobs: Arc::new(
                MemoryBlobStore::new()
                    .with_blob("rfp/section_c.pdf", "Program Manager, PMP required")
                    .with_blob("other/ignored.pdf", "not listed"),
            ),
            repository: StaffingRepository::new(Arc::new(MemoryDocumentStore::new())),
            config: test_config(),
            run_lock: Arc::new(Mutex::new(())),
        };
        build_router(state)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_ingest_then_read_and_update_run() {
        let app = app(&[ROLE_REPLY]);

        let (status, report) = call(&app, "POST", "/api/v1/ingestions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["records"].as_array().unwrap().len(), 1);
        let rfp_id = report["rfp_id"].as_str().unwrap().to_string();
        let id = report["records"][0].as_str().unwrap().to_string();

        let (status, records) = call(&app, "GET", &format!("/api/v1/extracts/{rfp_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(records[0]["blob_name"], "rfp/section_c.pdf");
        assert_eq!(records[0]["rfp_staffing_requirements"][0]["required_role"], "Program Manager");

        let (status, updated) = call(
            &app,
            "PATCH",
            &format!("/api/v1/extracts/{rfp_id}/{id}/status"),
            Some(json!({"status": "resume_created"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "resume_created");

        let (status, updated) = call(
            &app,
            "PATCH",
            &format!("/api/v1/extracts/{rfp_id}/{id}"),
            Some(json!({"field": "reviewer", "value": "Dana"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["reviewer"], "Dana");

        let (_, record) = call(&app, "GET", &format!("/api/v1/extracts/{rfp_id}/{id}"), None).await;
        assert_eq!(record["status"], "resume_created");
    }

    #[tokio::test]
    async fn test_prefix_override_limits_listing() {
        let app = app(&[]);
        let (status, report) = call(
            &app,
            "POST",
            "/api/v1/ingestions",
            Some(json!({"prefix": "nothing-here/"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(report["records"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_status_is_rejected() {
        let app = app(&[]);
        let uri = format!("/api/v1/extracts/{}/{}/status", Uuid::new_v4(), Uuid::new_v4());
        let (status, body) = call(&app, "PATCH", &uri, Some(json!({"status": "archived"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_record_keys_cannot_be_overwritten() {
        let app = app(&[]);
        let uri = format!("/api/v1/extracts/{}/{}", Uuid::new_v4(), Uuid::new_v4());
        let (status, _) = call(&app, "PATCH", &uri, Some(json!({"field": "rfp_id", "value": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_record_is_404() {
        let app = app(&[]);
        let uri = format!("/api/v1/extracts/{}/{}", Uuid::new_v4(), Uuid::new_v4());
        let (status, body) = call(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let (status, _) = call(
            &app,
            "PATCH",
            &format!("{uri}/status"),
            Some(json!({"status": "resume_created"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
