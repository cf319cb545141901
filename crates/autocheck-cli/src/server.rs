//! HTTP surface.
//!
//! | Route | Method | Purpose |
//! |---|---|---|
//! | `/api/evaluate` | POST | Run one evaluation |
//! | `/api/evaluations` | GET | Caller's history, newest first |
//! | `/api/quota` | GET | Caller's usage for the reference day |
//! | `/healthz` | GET | Liveness |

use std::sync::Arc;

use autocheck_core::{EvaluationOutputs, FieldIssue};
use autocheck_runtime::{
    bearer_token, Caller, EvaluateError, EvaluationRecord, EvaluationService, IdentityProvider,
    QuotaStatus,
};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct AppState {
    service: Arc<EvaluationService>,
    identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(service: EvaluationService, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            service: Arc::new(service),
            identity,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/evaluate", post(evaluate))
        .route("/api/evaluations", get(history))
        .route("/api/quota", get(quota))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<FieldIssue>>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: EvaluateError) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            error: err.public_message(),
            details: err.details(),
        }),
    )
}

fn caller(state: &AppState, headers: &HeaderMap) -> Option<Caller> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    state.identity.authenticate(bearer_token(value)?)
}

// The body is taken raw so malformed JSON maps to our own 400 payload.
async fn evaluate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EvaluationOutputs>, ApiError> {
    let caller = caller(&state, &headers);
    state
        .service
        .evaluate(caller.as_ref(), &body, Utc::now())
        .await
        .map(Json)
        .map_err(api_error)
}

async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<EvaluationRecord>>, ApiError> {
    let caller = caller(&state, &headers);
    state
        .service
        .history(caller.as_ref())
        .await
        .map(Json)
        .map_err(|e| {
            if e.is_server_error() {
                tracing::error!(error = %e, "Failed to list evaluations");
            }
            api_error(e)
        })
}

async fn quota(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<QuotaStatus>, ApiError> {
    let caller = caller(&state, &headers);
    state
        .service
        .quota_status(caller.as_ref(), Utc::now())
        .await
        .map(Json)
        .map_err(|e| {
            if e.is_server_error() {
                tracing::error!(error = %e, "Failed to read quota");
            }
            api_error(e)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use autocheck_core::RequestValidator;
    use autocheck_runtime::{
        ChatMessage, ChatProvider, CompletionConfig, CompletionResponse, InferenceOrchestrator,
        MemoryStore, ProviderError, QuotaEnforcer, RuntimeConfig, StaticTokenIdentity,
    };
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const COMPLIANCE: &str = r#"{"gdpr_status": "yellow", "gdpr_section": "Art. 6",
        "ai_act_status": "ok", "ai_act_section": "-",
        "explanations": {"gdpr": "Personenbezogene Daten", "ai_act": "Keine KI"}}"#;
    const BUSINESS_VALUE: &str = r#"{"score": 42, "narrative": "Hoher manueller Aufwand"}"#;
    const TOOLS: &str = r#"{"recommendations": [{"tool": "Zapier", "reason": "Mail-Trigger"}]}"#;

    /// Replies by recognising each task's prompt.
    struct CannedChat {
        calls: AtomicUsize,
        prose: bool,
    }

    #[async_trait]
    impl ChatProvider for CannedChat {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let user = messages
                .iter()
                .find(|m| m.role == "user")
                .map(|m| m.content.clone())
                .unwrap_or_default();

            let content = if self.prose {
                "Leider kann ich das nicht beurteilen.".to_string()
            } else if user.starts_with("Auszüge:") {
                COMPLIANCE.to_string()
            } else if user.contains("Business-Value-Score") {
                format!("```json\n{}\n```", BUSINESS_VALUE)
            } else {
                TOOLS.to_string()
            };

            Ok(CompletionResponse {
                content,
                model: config.model.clone(),
                ..Default::default()
            })
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn app_with(prose: bool) -> (Router, Arc<CannedChat>) {
        let chat = Arc::new(CannedChat {
            calls: AtomicUsize::new(0),
            prose,
        });
        let store = Arc::new(MemoryStore::new());
        let config = RuntimeConfig::default();
        let service = EvaluationService::new(
            RequestValidator::default(),
            QuotaEnforcer::from_config(store.clone(), &config.quota),
            InferenceOrchestrator::new(chat.clone()),
            store,
        );
        let identity = StaticTokenIdentity::new()
            .with_token("t-user", "u1", None)
            .with_token("t-admin", "root", Some("admin"));

        (router(AppState::new(service, Arc::new(identity))), chat)
    }

    fn app() -> (Router, Arc<CannedChat>) {
        app_with(false)
    }

    fn payload() -> String {
        json!({
            "description": "We manually copy invoice data from email attachments into our ERP every day",
            "timeRequired": "30–60 min",
            "frequency": "täglich",
            "stakeholder": "mein Team"
        })
        .to_string()
    }

    fn post_evaluate(token: Option<&str>, body: String) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/evaluate")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn get_with(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn test_evaluate_success() {
        let (app, chat) = app();
        let response = app
            .oneshot(post_evaluate(Some("t-user"), payload()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["compliance"]["gdpr_status"], "yellow");
        assert_eq!(body["businessValue"]["score"], 42.0);
        assert!(body["businessValue"]["score"].is_i64());
        assert_eq!(body["tools"]["recommendations"][0]["tool"], "Zapier");
        assert_eq!(chat.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_evaluate_requires_auth() {
        let (app, chat) = app();

        let missing = app
            .clone()
            .oneshot(post_evaluate(None, payload()))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let unknown = app
            .oneshot(post_evaluate(Some("stolen"), payload()))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_evaluate_validation_details() {
        let (app, chat) = app();
        let body = json!({"description": "abc", "timeRequired": "x", "frequency": "y"}).to_string();

        let response = app
            .oneshot(post_evaluate(Some("t-user"), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        let fields: Vec<&str> = body["details"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|d| d["field"].as_str())
            .collect();
        assert!(fields.contains(&"description"));
        assert!(fields.contains(&"stakeholder"));
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_evaluate_malformed_json() {
        let (app, _) = app();
        let response = app
            .oneshot(post_evaluate(Some("t-user"), "{not json".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Invalid JSON");
    }

    #[tokio::test]
    async fn test_fourth_request_is_429() {
        let (app, chat) = app();
        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(post_evaluate(Some("t-user"), payload()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(post_evaluate(Some("t-user"), payload()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(chat.calls.load(Ordering::SeqCst), 9);

        let admin = app
            .oneshot(post_evaluate(Some("t-admin"), payload()))
            .await
            .unwrap();
        assert_eq!(admin.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unrepairable_output_is_generic_500() {
        let (app, _) = app_with(true);
        let response = app
            .clone()
            .oneshot(post_evaluate(Some("t-user"), payload()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Evaluation failed");
        assert!(body.get("details").is_none());

        let history = app
            .oneshot(get_with("/api/evaluations", "t-user"))
            .await
            .unwrap();
        assert_eq!(json_body(history).await, json!([]));
    }

    #[tokio::test]
    async fn test_history_and_quota() {
        let (app, _) = app();
        app.clone()
            .oneshot(post_evaluate(Some("t-user"), payload()))
            .await
            .unwrap();

        let history = app
            .clone()
            .oneshot(get_with("/api/evaluations", "t-user"))
            .await
            .unwrap();
        assert_eq!(history.status(), StatusCode::OK);
        let records = json_body(history).await;
        assert_eq!(records.as_array().unwrap().len(), 1);
        assert_eq!(records[0]["user_id"], "u1");

        let quota = app
            .oneshot(get_with("/api/quota", "t-user"))
            .await
            .unwrap();
        let status = json_body(quota).await;
        assert_eq!(status["used"], 1);
        assert_eq!(status["remaining"], 2);
        assert_eq!(status["exempt"], false);
    }
}
