use ensemble_core::{EnsembleError, EnsembleResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Claude,
    OpenAi,
    OpenRouter,
    /// Groq cloud inference, OpenAI-compatible API.
    Groq,
    /// Local deterministic adapter that answers without any network call.
    /// Used for dry runs and smoke tests.
    Echo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: ProviderKind,
    pub model_id: String,
    #[serde(default)]
    pub api_key: String,
    /// Name of an environment variable holding the API key.
    /// Takes precedence over `api_key` when set.
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub api_base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

impl ModelConfig {
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url
        } else {
            match self.provider {
                ProviderKind::Claude => "https://api.anthropic.com",
                ProviderKind::OpenAi => "https://api.openai.com",
                ProviderKind::OpenRouter => "https://openrouter.ai/api",
                ProviderKind::Groq => "https://api.groq.com/openai",
                ProviderKind::Echo => "local://echo",
            }
        }
    }

    /// Resolve the API key, reading `api_key_env` from the environment if set.
    pub fn resolve_api_key(&self) -> EnsembleResult<String> {
        if let Some(var) = &self.api_key_env {
            return std::env::var(var).map_err(|_| {
                EnsembleError::Config(format!(
                    "API key variable '{var}' is not set for model '{}'",
                    self.model_id
                ))
            });
        }
        if self.api_key.is_empty() && self.provider != ProviderKind::Echo {
            return Err(EnsembleError::Config(format!(
                "No API key configured for model '{}'",
                self.model_id
            )));
        }
        Ok(self.api_key.clone())
    }
}
