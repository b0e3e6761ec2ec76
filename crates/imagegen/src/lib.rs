pub mod asset;
pub mod openai;
pub mod orchestrator;

#[cfg(test)]
mod provider_tests;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use asset::{AssetStore, GeneratedAsset};
pub use orchestrator::ImageOrchestrator;

/// Failure of a single provider attempt.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider response carried no image URL")]
    MissingUrl,

    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),
}

/// Failure of a complete generate-and-download run.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("all image providers failed, last was {provider}: {reason}")]
    ProviderUnavailable {
        provider: &'static str,
        reason: String,
    },

    #[error("asset download failed: {0}")]
    DownloadFailed(String),

    #[error("{stage} timed out after {after:?}")]
    Timeout {
        stage: &'static str,
        after: Duration,
    },

    #[error("failed to persist asset: {0}")]
    Storage(#[from] std::io::Error),
}

/// One way of turning a prompt into a remote image URL.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Request a single rendered image and return its URL.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Human-readable name for this provider (e.g., "openai-images").
    fn name(&self) -> &'static str;
}

/// Ordered list of providers; the first success wins.
pub struct ProviderChain {
    providers: Vec<Box<dyn ImageProvider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Box<dyn ImageProvider>>) -> Self {
        Self { providers }
    }

    /// The current OpenAI images protocol followed by the legacy one.
    ///
    /// Both variants hit the same logical API but fail independently (different
    /// models, request shapes and quotas), so the legacy call is a real fallback.
    pub fn openai(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self::new(vec![
            Box::new(openai::OpenAiImages::current(
                http.clone(),
                base_url,
                api_key,
            )),
            Box::new(openai::OpenAiImages::legacy(http, base_url, api_key)),
        ])
    }

    /// Names of the registered providers, in attempt order.
    pub fn names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Try every provider in order, bounding each attempt by `timeout`.
    /// Returns the first URL obtained, or the last failure.
    pub async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GenerationError> {
        let mut last_error = GenerationError::ProviderUnavailable {
            provider: "none",
            reason: "no image providers configured".to_string(),
        };

        for provider in &self.providers {
            let attempt = tokio::time::timeout(timeout, provider.generate(prompt)).await;
            let error = match attempt {
                Ok(Ok(url)) => {
                    tracing::debug!(provider = provider.name(), "Image generated");
                    return Ok(url);
                }
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout(timeout),
            };

            tracing::warn!(
                provider = provider.name(),
                error = %error,
                "Image provider failed, trying next"
            );

            last_error = match error {
                ProviderError::Timeout(after) => GenerationError::Timeout {
                    stage: "generation",
                    after,
                },
                other => GenerationError::ProviderUnavailable {
                    provider: provider.name(),
                    reason: other.to_string(),
                },
            };
        }

        Err(last_error)
    }
}
