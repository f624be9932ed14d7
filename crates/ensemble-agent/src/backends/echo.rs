use crate::adapter::AgentAdapter;
use crate::config::ModelConfig;
use async_trait::async_trait;
use ensemble_core::EnsembleResult;

/// Local adapter that answers by restating the request.
///
/// Never touches the network; lets the whole pipeline run without provider
/// credentials.
pub struct EchoAdapter {
    model_id: String,
}

impl EchoAdapter {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            model_id: config.model_id.clone(),
        }
    }
}

#[async_trait]
impl AgentAdapter for EchoAdapter {
    fn provider(&self) -> &str {
        "echo"
    }

    async fn complete(&self, prompt: &str, context: Option<&str>) -> EnsembleResult<String> {
        let mut answer = format!("[{}] Regarding the request: {}", self.model_id, prompt.trim());
        if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
            answer.push_str(&format!("\nGiven context: {}", ctx.trim()));
        }
        answer.push('.');
        Ok(answer)
    }
}
