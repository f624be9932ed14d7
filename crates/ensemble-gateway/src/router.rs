use crate::server::{AppState, GatewayConfig};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ensemble_core::CollaborationMode;
use ensemble_orchestrator::{HealthAlert, OrchestratorSnapshot, TaskResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Body of `POST /v1/tasks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub prompt: String,
    #[serde(default)]
    pub context: Option<String>,
    /// Omitted means single-agent dispatch.
    #[serde(default)]
    pub mode: Option<CollaborationMode>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

impl TaskRequest {
    fn validate(&self, config: &GatewayConfig) -> Result<(), ApiError> {
        if self.prompt.trim().is_empty() {
            return Err(ApiError::BadRequest("prompt must not be empty".into()));
        }
        check_length("prompt", &self.prompt, config.max_prompt_chars)?;
        if let Some(context) = &self.context {
            check_length("context", context, config.max_context_chars)?;
        }
        Ok(())
    }
}

fn check_length(field: &str, text: &str, max_chars: usize) -> Result<(), ApiError> {
    let len = text.chars().count();
    if len > max_chars {
        return Err(ApiError::BadRequest(format!(
            "{field} is {len} characters; the limit is {max_chars}"
        )));
    }
    Ok(())
}

pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TaskRequest>,
) -> Result<Json<TaskResult>, ApiError> {
    request.validate(&state.config)?;
    let result = state
        .orchestrator
        .submit(&request.prompt, request.context.as_deref(), request.mode)
        .await;
    info!(
        task_id = %result.task_id,
        cache_hit = result.cache_hit,
        confidence = result.confidence,
        "Task answered over HTTP"
    );
    Ok(Json(result))
}

pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<OrchestratorSnapshot> {
    Json(state.orchestrator.snapshot())
}

pub async fn list_alerts(State(state): State<Arc<AppState>>) -> Json<Vec<HealthAlert>> {
    Json(state.orchestrator.monitor().recent_alerts())
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let agents = state.orchestrator.router().store().len();
    Json(serde_json::json!({ "status": "ok", "service": "ensemble", "agents": agents }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::server::GatewayServer;
    use axum::body::Body;
    use axum::http::Request;
    use ensemble_agent::{ModelConfig, ProviderKind};
    use ensemble_orchestrator::{AgentConfig, EnsembleConfig, Orchestrator};
    use tower::ServiceExt;

    fn app(max_prompt_chars: usize) -> axum::Router {
        app_with(GatewayConfig {
            max_prompt_chars,
            ..GatewayConfig::default()
        })
    }

    fn app_with(gateway: GatewayConfig) -> axum::Router {
        let config = EnsembleConfig {
            agents: vec![AgentConfig {
                id: "echo".into(),
                capabilities: vec!["general".into()],
                model: ModelConfig {
                    provider: ProviderKind::Echo,
                    model_id: "echo".into(),
                    api_key: String::new(),
                    api_key_env: None,
                    api_base_url: None,
                    temperature: 0.0,
                    max_tokens: 64,
                },
            }],
            ..Default::default()
        };
        let orchestrator = Arc::new(Orchestrator::from_config(config).unwrap());
        GatewayServer::build_with_config(orchestrator, gateway)
    }

    fn post_task(body: serde_json::Value) -> Request<Body> {
        Request::post("/v1/tasks")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_request_mode_is_optional() {
        let req: TaskRequest = serde_json::from_str(r#"{"prompt":"hi"}"#).unwrap();
        assert!(req.mode.is_none());
        let req: TaskRequest =
            serde_json::from_str(r#"{"prompt":"hi","mode":"devils_advocate"}"#).unwrap();
        assert_eq!(req.mode, Some(CollaborationMode::DevilsAdvocate));
    }

    #[tokio::test]
    async fn test_blank_prompt_rejected() {
        let resp = app(100)
            .oneshot(post_task(serde_json::json!({ "prompt": "   " })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_prompt_rejected() {
        let resp = app(10)
            .oneshot(post_task(serde_json::json!({ "prompt": "x".repeat(11) })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_context_rejected() {
        let gateway = GatewayConfig {
            max_context_chars: 20,
            ..GatewayConfig::default()
        };
        let resp = app_with(gateway.clone())
            .oneshot(post_task(
                serde_json::json!({ "prompt": "hi", "context": "c".repeat(21) }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app_with(gateway)
            .oneshot(post_task(
                serde_json::json!({ "prompt": "hi", "context": "c".repeat(20) }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_prompt_at_limit_accepted() {
        let resp = app(10)
            .oneshot(post_task(serde_json::json!({ "prompt": "x".repeat(10) })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
