use async_trait::async_trait;

use super::{Provider, ProviderError, send_json};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Groq (OpenAI-compatible chat completions) client.
pub struct GroqProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GroqProvider {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_owned(),
        }
    }
}

#[async_trait]
impl Provider for GroqProvider {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body);
        let value = send_json(request, "Groq").await?;

        let text = value
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ProviderError::new("Groq output text is empty"));
        }
        Ok(text.to_owned())
    }
}
