//! Image generation pipeline.
//!
//! 1. Ask the provider chain for an image URL (first provider to succeed wins)
//! 2. Download the image with a bounded timeout
//! 3. Persist it as a uniquely named local asset

use std::time::Duration;

use courier_common::config::AppConfig;

use crate::asset::{AssetStore, GeneratedAsset};
use crate::{GenerationError, ProviderChain};

/// Generates images through a provider chain and stores them locally.
pub struct ImageOrchestrator {
    providers: ProviderChain,
    http: reqwest::Client,
    store: AssetStore,
    generation_timeout: Duration,
    download_timeout: Duration,
}

impl ImageOrchestrator {
    pub fn new(
        providers: ProviderChain,
        http: reqwest::Client,
        store: AssetStore,
        generation_timeout: Duration,
        download_timeout: Duration,
    ) -> Self {
        Self {
            providers,
            http,
            store,
            generation_timeout,
            download_timeout,
        }
    }

    /// Build the OpenAI-backed orchestrator described by the configuration.
    pub fn from_config(config: &AppConfig, http: reqwest::Client) -> Self {
        let providers =
            ProviderChain::openai(http.clone(), &config.openai_base_url, &config.openai_api_key);

        tracing::info!(
            providers = ?providers.names(),
            asset_dir = %config.asset_dir.display(),
            "Image orchestrator configured"
        );

        Self::new(
            providers,
            http,
            AssetStore::new(&config.asset_dir),
            Duration::from_secs(config.generation_timeout_secs),
            Duration::from_secs(config.download_timeout_secs),
        )
    }

    /// Generate an image for `prompt` and persist it locally.
    pub async fn generate(&self, prompt: &str) -> Result<GeneratedAsset, GenerationError> {
        let url = self
            .providers
            .generate(prompt, self.generation_timeout)
            .await?;

        tracing::info!(prompt, url = %url, "Image generated, downloading");

        let bytes = self.download(&url).await?;
        let asset = self.store.persist(&bytes).await?;

        tracing::info!(
            path = %asset.path().display(),
            size = bytes.len(),
            "Image stored"
        );
        Ok(asset)
    }

    /// Fetch the rendered image, bounded by the download timeout.
    async fn download(&self, url: &str) -> Result<Vec<u8>, GenerationError> {
        let fetch = async {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| GenerationError::DownloadFailed(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(GenerationError::DownloadFailed(format!(
                    "status {} from {}",
                    status, url
                )));
            }

            response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| GenerationError::DownloadFailed(e.to_string()))
        };

        tokio::time::timeout(self.download_timeout, fetch)
            .await
            .map_err(|_| GenerationError::Timeout {
                stage: "download",
                after: self.download_timeout,
            })?
    }
}
