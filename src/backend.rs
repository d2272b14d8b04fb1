//! ContentBackend: turn a prompt into text by walking a prioritized candidate list.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::provider::{Candidate, ProviderError, ProviderRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    pub candidate: Candidate,
    pub error: ProviderError,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("no generation candidates are configured")]
    NoCandidates,
    #[error("all providers failed: {}", FailureList(.failures))]
    AllProvidersExhausted { failures: Vec<CandidateFailure> },
}

struct FailureList<'a>(&'a [CandidateFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, failure) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", failure.candidate, failure.error)?;
        }
        Ok(())
    }
}

#[async_trait]
pub trait ContentBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Tries each candidate in order until one returns text.
///
/// Rate-limit failures move on immediately; any other failure waits
/// `retry_delay` first.
pub struct FallbackChain {
    candidates: Vec<Candidate>,
    registry: ProviderRegistry,
    retry_delay: Duration,
}

impl FallbackChain {
    pub fn new(candidates: Vec<Candidate>, registry: ProviderRegistry, retry_delay: Duration) -> Self {
        Self {
            candidates,
            registry,
            retry_delay,
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    async fn attempt(&self, candidate: &Candidate, prompt: &str) -> Result<String, ProviderError> {
        let Some(provider) = self.registry.get(&candidate.provider) else {
            return Err(ProviderError::new(format!(
                "client is not configured for provider {:?} (unknown provider or missing credentials)",
                candidate.provider
            )));
        };
        let text = provider.complete(&candidate.model, prompt).await?;
        if text.trim().is_empty() {
            return Err(ProviderError::new("provider returned empty text"));
        }
        Ok(text)
    }
}

#[async_trait]
impl ContentBackend for FallbackChain {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        if self.candidates.is_empty() {
            return Err(GenerationError::NoCandidates);
        }

        let mut failures = Vec::new();
        for (idx, candidate) in self.candidates.iter().enumerate() {
            tracing::info!(
                provider = %candidate.provider,
                model = %candidate.model,
                attempt = idx + 1,
                "generating with candidate"
            );
            match self.attempt(candidate, prompt).await {
                Ok(text) => {
                    tracing::info!(
                        provider = %candidate.provider,
                        model = %candidate.model,
                        chars = text.chars().count(),
                        "candidate succeeded"
                    );
                    return Ok(text);
                }
                Err(error) => {
                    let rate_limited = error.is_rate_limited();
                    tracing::warn!(
                        provider = %candidate.provider,
                        model = %candidate.model,
                        rate_limited,
                        error = %error,
                        "candidate failed"
                    );
                    let is_last = idx + 1 == self.candidates.len();
                    failures.push(CandidateFailure {
                        candidate: candidate.clone(),
                        error,
                    });
                    if !rate_limited && !is_last && !self.retry_delay.is_zero() {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        tracing::error!(candidates = failures.len(), "all providers failed");
        Err(GenerationError::AllProvidersExhausted { failures })
    }
}
