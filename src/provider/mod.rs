//! Content-generation providers: one HTTP (or process) client per vendor.

pub mod command;
pub mod gemini;
pub mod groq;
pub mod openai;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProviderSettings;

/// A failed call to one provider/model pair.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
    pub status: Option<u16>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Quota and rate-limit failures: the next candidate can be tried right away.
    pub fn is_rate_limited(&self) -> bool {
        if self.status == Some(429) {
            return true;
        }
        let message = self.message.to_lowercase();
        message.contains("quota") || message.contains("limit") || message.contains("429")
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ProviderError>;
}

/// One entry of the fallback chain: which provider to call with which model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub provider: String,
    pub model: String,
}

impl Candidate {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Parses `provider:model`.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let raw = raw.trim();
        let Some((provider, model)) = raw.split_once(':') else {
            anyhow::bail!("candidate must be of the form provider:model, got {raw:?}");
        };
        let provider = provider.trim().to_ascii_lowercase();
        let model = model.trim();
        if provider.is_empty() || model.is_empty() {
            anyhow::bail!("candidate must be of the form provider:model, got {raw:?}");
        }
        Ok(Self::new(provider, model))
    }

    /// Parses a comma-separated candidate list, preserving order.
    pub fn parse_list(raw: &str) -> anyhow::Result<Vec<Self>> {
        raw.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn default_chain() -> Vec<Self> {
        vec![
            Self::new("gemini", "gemini-2.0-flash"),
            Self::new("gemini", "gemini-2.0-flash-lite"),
            Self::new("gemini", "gemini-1.5-flash"),
            Self::new("groq", "llama3-8b-8192"),
        ]
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.provider, self.model)
    }
}

/// Providers by name. Built once at startup and shared read-only.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn with(mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        self.register(name, provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Provider>> {
        self.providers.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Registers every provider that has credentials (or a command) configured.
    pub fn from_settings(settings: &ProviderSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("build http client")?;

        let mut registry = Self::new();

        match &settings.gemini_api_key {
            Some(api_key) => {
                tracing::info!(provider = "gemini", "provider configured");
                registry.register(
                    "gemini",
                    Arc::new(gemini::GeminiProvider::new(
                        client.clone(),
                        &settings.gemini_base_url,
                        api_key,
                    )),
                );
            }
            None => tracing::warn!(provider = "gemini", "GEMINI_API_KEY is not set"),
        }

        match &settings.groq_api_key {
            Some(api_key) => {
                tracing::info!(provider = "groq", "provider configured");
                registry.register(
                    "groq",
                    Arc::new(groq::GroqProvider::new(
                        client.clone(),
                        &settings.groq_base_url,
                        api_key,
                    )),
                );
            }
            None => tracing::warn!(provider = "groq", "GROQ_API_KEY is not set"),
        }

        if let Some(api_key) = &settings.openai_api_key {
            tracing::info!(provider = "openai", "provider configured");
            registry.register(
                "openai",
                Arc::new(openai::OpenAiProvider::new(
                    client.clone(),
                    &settings.openai_base_url,
                    api_key,
                )),
            );
        }

        if let Some(program) = &settings.command {
            tracing::info!(provider = "command", command = %program, "provider configured");
            registry.register(
                "command",
                Arc::new(command::CommandProvider::new(
                    program.clone(),
                    settings.command_args.clone(),
                )),
            );
        }

        Ok(registry)
    }
}

/// Error message from a JSON error body (`{"error": {"message": ...}}`).
pub(crate) fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

/// Sends a JSON request and maps transport and HTTP failures to [`ProviderError`].
pub(crate) async fn send_json(
    request: reqwest::RequestBuilder,
    vendor: &str,
) -> Result<serde_json::Value, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|err| ProviderError::new(format!("{vendor} request failed: {err}")))?;

    let status = response.status();
    let raw = response
        .text()
        .await
        .map_err(|err| ProviderError::new(format!("read {vendor} response body: {err}")))?;
    if !status.is_success() {
        let message = parse_error_message(&raw).unwrap_or(raw);
        return Err(ProviderError::with_status(
            status.as_u16(),
            format!("{vendor} API error ({status}): {message}"),
        ));
    }

    serde_json::from_str(&raw)
        .map_err(|err| ProviderError::new(format!("parse {vendor} response: {err}")))
}
