use crate::adapter::AgentAdapter;
use crate::config::ModelConfig;
use async_trait::async_trait;
use ensemble_core::{EnsembleError, EnsembleResult};

/// Claude (Anthropic) API backend.
pub struct ClaudeAdapter {
    config: ModelConfig,
    api_key: String,
    http: reqwest::Client,
}

impl ClaudeAdapter {
    pub fn new(config: ModelConfig) -> EnsembleResult<Self> {
        let api_key = config.resolve_api_key()?;
        Ok(Self {
            config,
            api_key,
            http: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl AgentAdapter for ClaudeAdapter {
    fn provider(&self) -> &str {
        "claude"
    }

    async fn complete(&self, prompt: &str, context: Option<&str>) -> EnsembleResult<String> {
        let url = format!("{}/v1/messages", self.config.base_url());

        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });

        if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
            body["system"] = serde_json::json!(format!("Context for the request:\n{ctx}"));
        }

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
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
                "Claude API error {status}: {resp_body}"
            )));
        }

        parse_claude_response(&resp_body)
    }
}

/// Join the text blocks of a Messages API response.
pub fn parse_claude_response(body: &serde_json::Value) -> EnsembleResult<String> {
    let content = body["content"]
        .as_array()
        .ok_or_else(|| EnsembleError::Agent("Missing content in Claude response".into()))?;

    let text = content
        .iter()
        .filter(|block| block["type"].as_str() == Some("text"))
        .filter_map(|block| block["text"].as_str())
        .collect::<Vec<_>>()
        .join("\n");

    if text.trim().is_empty() {
        return Err(EnsembleError::Agent("Empty completion from Claude".into()));
    }
    Ok(text)
}
