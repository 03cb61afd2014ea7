//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. Service creation order
//! follows dependency order: shared infrastructure (HTTP client, key
//! resolver, cancellation token), then repositories, then providers, then
//! the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::events::LoggingEventEmitter;
use crate::providers::keys::{ApiKeys, KeyVault};
use crate::providers::llm::{ChatLlm, LlmConfig};
use crate::providers::stt::{HttpSpeechToText, SttConfig};
use crate::providers::{QuestionGenerator, SpeechToText, Summarizer};
use crate::registry::SessionRegistry;
use crate::repos::Repositories;
use crate::session::SessionOrchestrator;
use crate::suggest::SuggestionEngine;

/// Timeout for provider HTTP requests. Generous: full-audio chunks are
/// multi-megabyte uploads.
const PROVIDER_TIMEOUT_SECS: u64 = 300;

/// Core configuration consumed by [`bootstrap_services`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the HTTP/WebSocket server; 0 scans a small range.
    pub bind_port: u16,
    /// Process-wide provider API key (tenant keys take precedence).
    pub provider_api_key: Option<String>,
    /// Master secret for decrypting per-tenant keys at rest.
    pub master_key: Option<String>,
    /// Language hint forwarded to the transcription provider.
    pub language: Option<String>,
    pub stt: SttConfig,
    pub llm: LlmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_port: 8740,
            provider_api_key: None,
            master_key: None,
            language: None,
            stt: SttConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// The per-session state machine.
    pub orchestrator: Arc<SessionOrchestrator>,
    /// Process-wide session registry.
    pub registry: Arc<SessionRegistry>,
    /// Repository bundle (in-memory by default).
    pub repos: Repositories,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
    /// Shared HTTP client for connection pooling.
    http_client: Client,
}

impl BootstrappedServices {
    /// Returns the shared HTTP client.
    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    /// Initiates graceful shutdown of all services.
    ///
    /// In-flight finalizations stop submitting further provider chunks (the
    /// current call is allowed to complete) and persist partial results.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.cancel_token.cancel();
        log::info!(
            "[Bootstrap] Shutdown signalled ({} live session(s))",
            self.registry.len()
        );
    }
}

/// Creates the shared HTTP client for all provider communication.
fn create_http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
        .build()
        .expect("Failed to create HTTP client")
}

/// Bootstraps all application services with their dependencies.
pub fn bootstrap_services(config: &Config) -> BootstrappedServices {
    let http_client = create_http_client();
    let cancel_token = CancellationToken::new();
    let repos = Repositories::in_memory();
    let registry = Arc::new(SessionRegistry::new());

    // Key resolution: per-tenant encrypted keys when a master secret is
    // configured, otherwise the fixed process-wide key
    let keys = Arc::new(match &config.master_key {
        Some(master) => ApiKeys::with_tenant_keys(
            config.provider_api_key.clone(),
            KeyVault::from_secret(master),
            Arc::clone(&repos.organizations),
        ),
        None => ApiKeys::fixed(config.provider_api_key.clone()),
    });

    let stt: Arc<dyn SpeechToText> = Arc::new(HttpSpeechToText::new(
        http_client.clone(),
        Arc::clone(&keys),
        config.stt.clone(),
    ));
    let llm = Arc::new(ChatLlm::new(
        http_client.clone(),
        Arc::clone(&keys),
        config.llm.clone(),
    ));
    let generator: Arc<dyn QuestionGenerator> = llm.clone();
    let summarizer: Arc<dyn Summarizer> = llm;

    let orchestrator = SessionOrchestrator::new(
        Arc::clone(&registry),
        repos.clone(),
        stt,
        SuggestionEngine::new(generator, repos.clone()),
        summarizer,
        Arc::new(LoggingEventEmitter),
        cancel_token.clone(),
        config.language.clone(),
    );

    BootstrappedServices {
        orchestrator,
        registry,
        repos,
        cancel_token,
        http_client,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_client_has_timeout() {
        let client = create_http_client();
        // We can't directly test timeout, but verify client is created
        assert!(client.get("http://example.com").build().is_ok());
    }

    #[tokio::test]
    async fn bootstrap_wires_a_working_registry() {
        let services = bootstrap_services(&Config::default());
        assert!(services.registry.is_empty());
        services.registry.create("s1");
        assert_eq!(services.orchestrator.registry().len(), 1);
        services.shutdown().await;
        assert!(services.cancel_token.is_cancelled());
    }
}
