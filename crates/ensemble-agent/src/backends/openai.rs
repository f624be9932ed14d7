use crate::adapter::AgentAdapter;
use crate::config::{ModelConfig, ProviderKind};
use async_trait::async_trait;
use ensemble_core::{EnsembleError, EnsembleResult};

/// OpenAI-compatible API backend.
///
/// Works with OpenAI, OpenRouter, Groq, Ollama, and any other provider
/// that implements the OpenAI chat completions API.
pub struct OpenAiAdapter {
    config: ModelConfig,
    api_key: String,
    http: reqwest::Client,
}

impl OpenAiAdapter {
    pub fn new(config: ModelConfig) -> EnsembleResult<Self> {
        let api_key = config.resolve_api_key()?;
        Ok(Self {
            config,
            api_key,
            http: reqwest::Client::new(),
        })
    }

    fn build_messages(&self, prompt: &str, context: Option<&str>) -> Vec<serde_json::Value> {
        let mut api_messages: Vec<serde_json::Value> = Vec::new();

        if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
            api_messages.push(serde_json::json!({
                "role": "system",
                "content": format!("Context for the request:\n{ctx}")
            }));
        }

        api_messages.push(serde_json::json!({
            "role": "user",
            "content": prompt
        }));

        api_messages
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");

        // OpenRouter requires extra headers
        if matches!(self.config.provider, ProviderKind::OpenRouter) {
            request
                .header("HTTP-Referer", env!("CARGO_PKG_REPOSITORY"))
                .header("X-Title", "Ensemble")
        } else {
            request
        }
    }
}

#[async_trait]
impl AgentAdapter for OpenAiAdapter {
    fn provider(&self) -> &str {
        match self.config.provider {
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Groq => "groq",
            _ => "openai",
        }
    }

    async fn complete(&self, prompt: &str, context: Option<&str>) -> EnsembleResult<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());

        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": self.build_messages(prompt, context),
        });

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| EnsembleError::Http(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| EnsembleError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(EnsembleError::Http(format!(
                "OpenAI API error {status}: {resp_body}"
            )));
        }

        parse_openai_response(&resp_body)
    }
}

/// Extract the assistant text from a chat completions response body.
pub fn parse_openai_response(body: &serde_json::Value) -> EnsembleResult<String> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| EnsembleError::Agent("Missing content in OpenAI response".into()))?;

    if content.trim().is_empty() {
        return Err(EnsembleError::Agent("Empty completion from OpenAI".into()));
    }
    Ok(content.to_string())
}
