use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{ImageProvider, ProviderError};

/// Which revision of the images endpoint to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVariant {
    /// `model` is sent explicitly and the large size is requested.
    Current,
    /// The pre-model request shape with the small default size.
    Legacy,
}

impl ApiVariant {
    fn model(self) -> Option<&'static str> {
        match self {
            ApiVariant::Current => Some("dall-e-3"),
            ApiVariant::Legacy => None,
        }
    }

    fn size(self) -> &'static str {
        match self {
            ApiVariant::Current => "1024x1024",
            ApiVariant::Legacy => "512x512",
        }
    }
}

#[derive(Debug, Serialize)]
struct ImagesRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    prompt: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

/// OpenAI images API client for one protocol variant.
pub struct OpenAiImages {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    variant: ApiVariant,
}

impl OpenAiImages {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str, variant: ApiVariant) -> Self {
        Self {
            http,
            endpoint: format!("{}/v1/images/generations", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            variant,
        }
    }

    pub fn current(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self::new(http, base_url, api_key, ApiVariant::Current)
    }

    pub fn legacy(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self::new(http, base_url, api_key, ApiVariant::Legacy)
    }
}

#[async_trait]
impl ImageProvider for OpenAiImages {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = ImagesRequest {
            model: self.variant.model(),
            prompt,
            n: 1,
            size: self.variant.size(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ImagesResponse = response.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .ok_or(ProviderError::MissingUrl)
    }

    fn name(&self) -> &'static str {
        match self.variant {
            ApiVariant::Current => "openai-images",
            ApiVariant::Legacy => "openai-images-legacy",
        }
    }
}
