//! Tests for the OpenAI providers, the fallback chain and the orchestrator.
//!
//! HTTP endpoints (images API and the asset host) are served by `wiremock`;
//! chain behavior is exercised with in-process stub providers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::asset::AssetStore;
use crate::openai::OpenAiImages;
use crate::orchestrator::ImageOrchestrator;
use crate::{GenerationError, ImageProvider, ProviderChain, ProviderError};

// ───────────────────────────── helpers ──────────────────────────────

/// Provider that either returns a fixed URL or fails, counting its calls.
struct StubProvider {
    name: &'static str,
    url: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl StubProvider {
    fn ok(name: &'static str, url: &str) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = Self {
            name,
            url: Some(url.to_string()),
            calls: calls.clone(),
        };
        (provider, calls)
    }

    fn failing(name: &'static str) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = Self {
            name,
            url: None,
            calls: calls.clone(),
        };
        (provider, calls)
    }
}

#[async_trait]
impl ImageProvider for StubProvider {
    async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.url.clone().ok_or(ProviderError::Status {
            status: 503,
            body: "overloaded".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Provider that never answers.
struct HangingProvider;

#[async_trait]
impl ImageProvider for HangingProvider {
    async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("http://never".to_string())
    }

    fn name(&self) -> &'static str {
        "hanging"
    }
}

fn orchestrator(chain: ProviderChain, dir: &std::path::Path, download_timeout: Duration) -> ImageOrchestrator {
    ImageOrchestrator::new(
        chain,
        reqwest::Client::new(),
        AssetStore::new(dir),
        Duration::from_secs(5),
        download_timeout,
    )
}

const TIMEOUT: Duration = Duration::from_secs(5);

// ═══════════════════════════════════════════════════════════════════
//  OpenAI providers
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_openai_current_request_and_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "dall-e-3",
            "prompt": "a red fox",
            "n": 1,
            "size": "1024x1024"
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": [{ "url": "https://cdn.example/fox.png" }] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiImages::current(reqwest::Client::new(), &server.uri(), "sk-test");
    let url = provider.generate("a red fox").await.unwrap();
    assert_eq!(url, "https://cdn.example/fox.png");
    assert_eq!(provider.name(), "openai-images");
}

#[tokio::test]
async fn test_openai_legacy_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(body_partial_json(json!({ "n": 1, "size": "512x512" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": [{ "url": "https://cdn.example/legacy.png" }] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiImages::legacy(reqwest::Client::new(), &server.uri(), "sk-test");
    assert_eq!(
        provider.generate("x").await.unwrap(),
        "https://cdn.example/legacy.png"
    );
    assert_eq!(provider.name(), "openai-images-legacy");
}

#[tokio::test]
async fn test_openai_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let provider = OpenAiImages::current(reqwest::Client::new(), &server.uri(), "sk-test");
    let err = provider.generate("x").await.unwrap_err();
    assert!(
        matches!(err, ProviderError::Status { status: 429, ref body } if body == "rate limited")
    );
}

#[tokio::test]
async fn test_openai_missing_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    let provider = OpenAiImages::current(reqwest::Client::new(), &server.uri(), "sk-test");
    assert!(matches!(
        provider.generate("x").await,
        Err(ProviderError::MissingUrl)
    ));
}

// ═══════════════════════════════════════════════════════════════════
//  ProviderChain
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_chain_falls_back_to_secondary() {
    let (primary, primary_calls) = StubProvider::failing("primary");
    let (secondary, secondary_calls) = StubProvider::ok("secondary", "http://img/secondary.png");
    let chain = ProviderChain::new(vec![Box::new(primary), Box::new(secondary)]);

    let url = chain.generate("p", TIMEOUT).await.unwrap();
    assert_eq!(url, "http://img/secondary.png");
    assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(secondary_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_chain_stops_at_first_success() {
    let (primary, _) = StubProvider::ok("primary", "http://img/primary.png");
    let (secondary, secondary_calls) = StubProvider::ok("secondary", "http://img/secondary.png");
    let chain = ProviderChain::new(vec![Box::new(primary), Box::new(secondary)]);

    assert_eq!(
        chain.generate("p", TIMEOUT).await.unwrap(),
        "http://img/primary.png"
    );
    assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_chain_reports_last_failure() {
    let (primary, _) = StubProvider::failing("primary");
    let (secondary, _) = StubProvider::failing("secondary");
    let chain = ProviderChain::new(vec![Box::new(primary), Box::new(secondary)]);

    let err = chain.generate("p", TIMEOUT).await.unwrap_err();
    assert!(matches!(
        err,
        GenerationError::ProviderUnavailable { provider: "secondary", .. }
    ));
}

#[tokio::test]
async fn test_empty_chain_is_unavailable() {
    let chain = ProviderChain::new(vec![]);
    assert!(matches!(
        chain.generate("p", TIMEOUT).await,
        Err(GenerationError::ProviderUnavailable { provider: "none", .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_chain_times_out_hanging_provider_and_falls_back() {
    let (secondary, _) = StubProvider::ok("secondary", "http://img/ok.png");
    let chain = ProviderChain::new(vec![Box::new(HangingProvider), Box::new(secondary)]);

    assert_eq!(
        chain.generate("p", Duration::from_secs(120)).await.unwrap(),
        "http://img/ok.png"
    );
}

#[tokio::test(start_paused = true)]
async fn test_chain_last_timeout_is_reported_as_timeout() {
    let (primary, _) = StubProvider::failing("primary");
    let chain = ProviderChain::new(vec![Box::new(primary), Box::new(HangingProvider)]);

    let err = chain.generate("p", Duration::from_secs(120)).await.unwrap_err();
    assert!(matches!(
        err,
        GenerationError::Timeout { stage: "generation", .. }
    ));
}

#[test]
fn test_openai_chain_order() {
    let chain = ProviderChain::openai(reqwest::Client::new(), "http://x", "k");
    assert_eq!(chain.names(), vec!["openai-images", "openai-images-legacy"]);
}

// ═══════════════════════════════════════════════════════════════════
//  ImageOrchestrator
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_downloaded_bytes_are_stored_exactly() {
    let server = MockServer::start().await;
    let bytes: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    Mock::given(method("GET"))
        .and(path("/img.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let (provider, _) = StubProvider::ok("stub", &format!("{}/img.png", server.uri()));
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(ProviderChain::new(vec![Box::new(provider)]), dir.path(), TIMEOUT);

    let asset = orchestrator.generate("p").await.unwrap();
    assert_eq!(asset.read().await.unwrap(), bytes);
}

#[tokio::test]
async fn test_openai_fallback_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(body_partial_json(json!({ "model": "dall-e-3" })))
        .respond_with(ResponseTemplate::new(500).set_body_string("model unavailable"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(body_partial_json(json!({ "size": "512x512" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "url": format!("{}/legacy.png", server.uri()) }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/legacy.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"legacy-bytes".to_vec()))
        .mount(&server)
        .await;

    let http = reqwest::Client::new();
    let chain = ProviderChain::openai(http, &server.uri(), "sk-test");
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(chain, dir.path(), TIMEOUT);

    let asset = orchestrator.generate("p").await.unwrap();
    assert_eq!(asset.read().await.unwrap(), b"legacy-bytes");
}

#[tokio::test]
async fn test_download_non_success_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (provider, _) = StubProvider::ok("stub", &format!("{}/gone.png", server.uri()));
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(ProviderChain::new(vec![Box::new(provider)]), dir.path(), TIMEOUT);

    assert!(matches!(
        orchestrator.generate("p").await,
        Err(GenerationError::DownloadFailed(_))
    ));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_download_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let (provider, _) = StubProvider::ok("stub", &format!("{}/slow.png", server.uri()));
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(
        ProviderChain::new(vec![Box::new(provider)]),
        dir.path(),
        Duration::from_millis(100),
    );

    assert!(matches!(
        orchestrator.generate("p").await,
        Err(GenerationError::Timeout { stage: "download", .. })
    ));
}
