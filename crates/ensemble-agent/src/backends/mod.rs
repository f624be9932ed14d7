pub mod claude;
pub mod echo;
pub mod openai;

use crate::adapter::AgentAdapter;
use crate::config::{ModelConfig, ProviderKind};
use ensemble_core::EnsembleResult;
use std::sync::Arc;

/// Build the adapter for a provider configuration.
///
/// To add a new provider:
/// 1. Create a new module in `backends/`
/// 2. Implement `AgentAdapter` for your struct
/// 3. Add the variant to `ProviderKind` in `config.rs`
/// 4. Wire it up here
pub fn build_adapter(config: ModelConfig) -> EnsembleResult<Arc<dyn AgentAdapter>> {
    let adapter: Arc<dyn AgentAdapter> = match config.provider {
        ProviderKind::Claude => Arc::new(claude::ClaudeAdapter::new(config)?),
        ProviderKind::OpenAi | ProviderKind::OpenRouter | ProviderKind::Groq => {
            Arc::new(openai::OpenAiAdapter::new(config)?)
        }
        ProviderKind::Echo => Arc::new(echo::EchoAdapter::new(&config)),
    };
    Ok(adapter)
}
