use async_trait::async_trait;

use super::{Provider, ProviderError, send_json};

/// OpenAI Responses API client.
pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    temperature: f32,
}

impl OpenAiProvider {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            endpoint: responses_endpoint(base_url),
            api_key: api_key.to_owned(),
            temperature: 0.8,
        }
    }
}

pub fn responses_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/responses")
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        let mut body = serde_json::json!({
            "model": model,
            "input": prompt,
            "text": { "format": { "type": "text" } },
            "store": false,
        });

        // NOTE: GPT-5 models reject sampling params like `temperature`.
        if !model.starts_with("gpt-5")
            && let Some(obj) = body.as_object_mut()
        {
            obj.insert("temperature".to_owned(), serde_json::json!(self.temperature));
        }

        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body);
        let value = send_json(request, "OpenAI").await?;
        extract_output_text(&value)
    }
}

fn extract_output_text(value: &serde_json::Value) -> Result<String, ProviderError> {
    let output = value
        .get("output")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ProviderError::new("missing `output` array in OpenAI response"))?;

    let mut text = String::new();
    for item in output {
        if item.get("type").and_then(|v| v.as_str()) != Some("message") {
            continue;
        }
        let Some(content) = item.get("content").and_then(|v| v.as_array()) else {
            continue;
        };
        for part in content {
            if part.get("type").and_then(|v| v.as_str()) != Some("output_text") {
                continue;
            }
            if let Some(part_text) = part.get("text").and_then(|v| v.as_str()) {
                text.push_str(part_text);
            }
        }
    }

    if text.trim().is_empty() {
        return Err(ProviderError::new("OpenAI output text is empty"));
    }
    Ok(text)
}
