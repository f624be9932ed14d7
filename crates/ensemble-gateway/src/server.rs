use crate::middleware::trace_middleware;
use crate::router::{health_handler, list_agents, list_alerts, submit_task};
use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use ensemble_orchestrator::Orchestrator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Limits applied to inbound requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Longest accepted prompt, in characters.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    /// Longest accepted context, in characters.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

fn default_max_prompt_chars() -> usize {
    16_000
}

fn default_max_context_chars() -> usize {
    64_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: default_max_prompt_chars(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

/// Shared application state.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub config: GatewayConfig,
}

/// The HTTP gateway.
pub struct GatewayServer;

impl GatewayServer {
    pub fn build(orchestrator: Arc<Orchestrator>) -> Router {
        Self::build_with_config(orchestrator, GatewayConfig::default())
    }

    pub fn build_with_config(orchestrator: Arc<Orchestrator>, config: GatewayConfig) -> Router {
        let state = Arc::new(AppState {
            orchestrator,
            config,
        });

        Router::new()
            .route("/v1/tasks", post(submit_task))
            .route("/v1/agents", get(list_agents))
            .route("/v1/alerts", get(list_alerts))
            .route("/health", get(health_handler))
            .layer(axum_mw::from_fn(trace_middleware))
            .with_state(state)
    }
}
