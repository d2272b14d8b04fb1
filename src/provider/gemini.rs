use async_trait::async_trait;

use super::{Provider, ProviderError, send_json};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini `generateContent` client.
pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiProvider {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        let endpoint = format!("{}/models/{model}:generateContent", self.base_url);
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });
        let request = self
            .client
            .post(endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        let value = send_json(request, "Gemini").await?;
        extract_text(&value)
    }
}

fn extract_text(value: &serde_json::Value) -> Result<String, ProviderError> {
    let candidate = value
        .get("candidates")
        .and_then(|v| v.as_array())
        .and_then(|candidates| candidates.first())
        .ok_or_else(|| match blocked_reason(value) {
            Some(reason) => ProviderError::new(format!("Gemini blocked the prompt: {reason}")),
            None => ProviderError::new("missing `candidates` in Gemini response"),
        })?;

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter_map(|part| part.get("text").and_then(|v| v.as_str()))
        .collect();

    if text.trim().is_empty() {
        return Err(ProviderError::new("Gemini output text is empty"));
    }
    Ok(text)
}

fn blocked_reason(value: &serde_json::Value) -> Option<&str> {
    value.pointer("/promptFeedback/blockReason")?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_all_parts_of_first_candidate() {
        let value = serde_json::json!({
            "candidates": [
                { "content": { "parts": [{ "text": "Rain " }, { "text": "fell." }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        });
        assert_eq!(extract_text(&value).unwrap(), "Rain fell.");
    }

    #[test]
    fn blocked_prompt_is_reported() {
        let value = serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = extract_text(&value).unwrap_err();
        assert!(err.message.contains("SAFETY"));
        assert!(!err.is_rate_limited());
    }
}
