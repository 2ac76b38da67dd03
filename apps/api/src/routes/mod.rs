pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::orchestrator::handlers;
use crate::roles::handlers as roles;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Roles
        .route("/api/v1/roles", get(roles::handle_list_roles))
        .route("/api/v1/roles/:role/skills", get(roles::handle_role_skills))
        // Job postings
        .route(
            "/api/v1/job-postings",
            post(handlers::handle_publish_job_posting),
        )
        .route(
            "/api/v1/job-postings/:id",
            get(handlers::handle_get_job_posting),
        )
        .route(
            "/api/v1/job-postings/:id/regenerate",
            post(handlers::handle_regenerate_questions),
        )
        // Assessments
        .route("/api/v1/assessments", post(handlers::handle_submit))
        .route(
            "/api/v1/assessments/:id/status",
            get(handlers::handle_get_status),
        )
        .route(
            "/api/v1/assessments/:id/questions",
            get(handlers::handle_get_questions),
        )
        .route(
            "/api/v1/assessments/:id/answers",
            post(handlers::handle_submit_answers),
        )
        .route(
            "/api/v1/assessments/:id/finalize",
            post(handlers::handle_finalize),
        )
        .route(
            "/api/v1/assessments/:id/report",
            get(handlers::handle_get_report),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::{Config, OrchestrationConfig, ScoringConfig};
    use crate::orchestrator::jobs::JobReceiver;
    use crate::orchestrator::{JobQueue, Orchestrator};
    use crate::questions::QuestionSourceResolver;
    use crate::scoring::ScoringEngine;
    use crate::store::MemoryStore;
    use crate::test_support::{verdict, FakeContext, FakeGenerator, FakeGrader};

    /// The receiver must outlive the router or enqueues fail.
    fn test_router() -> (Router, JobReceiver) {
        let store = Arc::new(MemoryStore::new());
        let context = Arc::new(FakeContext::default());
        let resolver = QuestionSourceResolver::new(
            store.clone(),
            Arc::new(FakeGenerator::valid()),
            context.clone(),
            1,
        );
        let scoring = ScoringEngine::new(
            store.clone(),
            Arc::new(FakeGrader::always(verdict(7.0, 7.0, 7.0, 7.0))),
            context,
            ScoringConfig::default(),
        );
        let (queue, receiver) = JobQueue::new(8);
        let orchestrator = Orchestrator::new(
            store,
            resolver,
            scoring,
            queue,
            OrchestrationConfig::default(),
        );
        let router = build_router(AppState {
            orchestrator: Arc::new(orchestrator),
            config: Config {
                database_url: None,
                llm_api_key: "test".into(),
                llm_api_url: "http://localhost:0".into(),
                llm_model: "test-model".into(),
                context_service_url: "http://localhost:0".into(),
                port: 0,
                rust_log: "debug".into(),
                orchestration: OrchestrationConfig::default(),
                scoring: ScoringConfig::default(),
            },
        });
        (router, receiver)
    }

    async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(json) => Body::from(json.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _receiver) = test_router();
        let (status, body) = call(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "assessment-api");
        assert_eq!(body["storage"], "memory");
    }

    #[tokio::test]
    async fn test_candidate_flow_over_http() {
        let (router, _receiver) = test_router();
        let (status, posting) = call(
            &router,
            "POST",
            "/api/v1/job-postings",
            Some(json!({
                "title": "Platform Engineer",
                "role_type": "DevOps",
                "description": "Kubernetes, Terraform and on-call."
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(posting["current_set"]["version"], 1);

        let (status, ack) = call(
            &router,
            "POST",
            "/api/v1/assessments",
            Some(json!({
                "job_posting_id": posting["id"],
                "candidate_name": "Lee",
                "candidate_email": "lee@example.com",
                "question_source": "job_description"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(ack["state"], "questions_ready");
        let id = ack["assessment_id"].as_str().unwrap().to_string();

        let (status, questions) =
            call(&router, "GET", &format!("/api/v1/assessments/{id}/questions"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(questions.as_array().unwrap().len(), 10);
        assert!(questions[0].get("expected_keywords").is_none());

        let (status, _) = call(
            &router,
            "POST",
            &format!("/api/v1/assessments/{id}/answers"),
            Some(json!({
                "answers": [{ "question_index": 1, "text": "We pinned provider versions and ran plan in CI." }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            call(&router, "GET", &format!("/api/v1/assessments/{id}/report"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");

        let (status, ack) =
            call(&router, "POST", &format!("/api/v1/assessments/{id}/finalize"), None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(ack["queued"], true);

        let (status, ack) =
            call(&router, "POST", &format!("/api/v1/assessments/{id}/finalize"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["queued"], false);
    }

    #[tokio::test]
    async fn test_input_errors_map_to_400_and_404() {
        let (router, _receiver) = test_router();
        let (status, body) = call(
            &router,
            "POST",
            "/api/v1/job-postings",
            Some(json!({ "title": "X", "role_type": "Designer", "description": "Y" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let missing = uuid::Uuid::new_v4();
        let (status, _) = call(
            &router,
            "GET",
            &format!("/api/v1/assessments/{missing}/status"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&router, "GET", "/api/v1/roles/designer/skills", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
