use async_trait::async_trait;
use ensemble_core::{AgentId, EnsembleResult};
use serde::{Deserialize, Serialize};

/// Uniform interface over one backing language-model provider.
///
/// Each provider (Claude, OpenAI-compatible, local echo, test doubles)
/// implements this trait; everything above it treats providers identically.
/// Timeouts are enforced by the caller, so implementations may simply await
/// their provider.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Short provider label for logs (e.g. `"claude"`).
    fn provider(&self) -> &str;

    /// Send `prompt` (with optional supporting `context`) and return the text answer.
    async fn complete(&self, prompt: &str, context: Option<&str>) -> EnsembleResult<String>;
}

/// Outcome of a single adapter call, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub agent_id: AgentId,
    pub text: String,
    pub latency_ms: u64,
    pub success: bool,
    pub error: Option<String>,
    /// The call was cancelled because it exceeded its deadline.
    #[serde(default)]
    pub timed_out: bool,
}

impl Invocation {
    pub fn ok(agent_id: impl Into<AgentId>, text: String, latency_ms: u64) -> Self {
        Self {
            agent_id: agent_id.into(),
            text,
            latency_ms,
            success: true,
            error: None,
            timed_out: false,
        }
    }

    pub fn failed(agent_id: impl Into<AgentId>, error: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            agent_id: agent_id.into(),
            text: String::new(),
            latency_ms,
            success: false,
            error: Some(error.into()),
            timed_out: false,
        }
    }

    pub fn timeout(agent_id: impl Into<AgentId>, latency_ms: u64) -> Self {
        Self {
            timed_out: true,
            ..Self::failed(agent_id, format!("Timeout after {latency_ms} ms"), latency_ms)
        }
    }
}
