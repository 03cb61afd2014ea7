//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use parley_core::Config;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ServerConfig {
    /// Port to bind the HTTP server to.
    /// Override: `PARLEY_BIND_PORT`
    pub bind_port: u16,

    /// Process-wide provider API key.
    /// Override: `PARLEY_PROVIDER_API_KEY`
    pub provider_api_key: Option<String>,

    /// Master secret for per-tenant encrypted provider keys.
    /// Override: `PARLEY_MASTER_KEY`
    pub master_key: Option<String>,

    /// Language hint for the transcription provider (e.g. "en").
    pub language: Option<String>,

    /// Transcription provider endpoint base.
    pub stt_base_url: Option<String>,

    /// Model for live streaming windows.
    pub stt_streaming_model: Option<String>,

    /// Diarization-capable model for the full-audio pass.
    pub stt_diarized_model: Option<String>,

    /// Generation provider endpoint base.
    pub llm_base_url: Option<String>,

    /// Generation model.
    pub llm_model: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: 8740,
            provider_api_key: None,
            master_key: None,
            language: None,
            stt_base_url: None,
            stt_streaming_model: None,
            stt_diarized_model: None,
            llm_base_url: None,
            llm_model: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PARLEY_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("PARLEY_PROVIDER_API_KEY") {
            if !val.is_empty() {
                self.provider_api_key = Some(val);
            }
        }

        if let Ok(val) = std::env::var("PARLEY_MASTER_KEY") {
            if !val.is_empty() {
                self.master_key = Some(val);
            }
        }
    }

    /// Converts to parley-core's Config type.
    pub fn to_core_config(&self) -> Config {
        let mut config = Config {
            bind_port: self.bind_port,
            provider_api_key: self.provider_api_key.clone(),
            master_key: self.master_key.clone(),
            language: self.language.clone(),
            ..Default::default()
        };
        if let Some(url) = &self.stt_base_url {
            config.stt.base_url = url.clone();
        }
        if let Some(model) = &self.stt_streaming_model {
            config.stt.streaming_model = model.clone();
        }
        if let Some(model) = &self.stt_diarized_model {
            config.stt.diarized_model = model.clone();
        }
        if let Some(url) = &self.llm_base_url {
            config.llm.base_url = url.clone();
        }
        if let Some(model) = &self.llm_model {
            config.llm.model = model.clone();
        }
        config
    }
}
