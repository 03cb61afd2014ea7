//! External generative and transcription providers.
//!
//! The core never talks to a provider directly; it depends on the traits in
//! this module. HTTP implementations live in [`stt`] and [`llm`], per-tenant
//! key handling in [`keys`].

pub mod keys;
pub mod llm;
pub mod stt;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::summary::{MeetingSummary, SummaryRequest};

/// Substrings that mark a 4xx provider error as transient despite its class.
/// These show up in otherwise-opaque provider error bodies.
const TRANSIENT_4XX_MARKERS: [&str; 4] = [
    "something went wrong",
    "temporary",
    "timeout",
    "reading your request",
];

/// Error from a transcription or generation provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure (connect, timeout, body read).
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status with the provider's error body.
    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },

    /// No API key available for the request.
    #[error("provider API key missing")]
    MissingKey,

    /// Response body did not match the expected shape.
    #[error("failed to parse provider response: {0}")]
    Parse(String),
}

impl ProviderError {
    /// Whether a retry may succeed: 5xx, 429, network-level failures, and
    /// known-transient 4xx bodies.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status { status, message } => {
                if *status >= 500 || *status == 429 {
                    return true;
                }
                if (400..500).contains(status) {
                    let lower = message.to_lowercase();
                    return TRANSIENT_4XX_MARKERS.iter().any(|m| lower.contains(m));
                }
                false
            }
            Self::MissingKey | Self::Parse(_) => false,
        }
    }
}

/// Convenient Result alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Options for a transcription request.
#[derive(Debug, Clone, Default)]
pub struct TranscribeOptions {
    /// Language hint for the provider, if known.
    pub language: Option<String>,
    /// Request the diarization-capable model with segment timestamps.
    pub diarize: bool,
    /// Tenant whose provider key should be used, if configured.
    pub tenant_id: Option<String>,
}

/// One diarized segment from the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSegment {
    /// Segment start offset in seconds.
    pub start: f64,
    /// Segment end offset in seconds.
    pub end: f64,
    pub text: String,
    /// Opaque diarization id; not speaker identification.
    #[serde(default)]
    pub speaker: Option<i32>,
}

/// Verbose transcription response from the provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerboseTranscription {
    pub text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub segments: Vec<ProviderSegment>,
}

/// Remote speech-to-text service accepting WAV uploads.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Submits a WAV container for verbose-JSON transcription.
    async fn transcribe_wav(
        &self,
        wav: Vec<u8>,
        opts: &TranscribeOptions,
    ) -> ProviderResult<VerboseTranscription>;

    /// Whether a process-wide API key is configured.
    fn is_configured(&self) -> bool;
}

/// Inputs for one question-generation invocation.
#[derive(Debug, Clone)]
pub struct QuestionRequest<'a> {
    /// Formatted knowledge-base context (deck, thesis, prior turns, docs).
    pub kb_context: &'a str,
    /// Recent transcript window; empty for the initial invocation.
    pub recent_transcript: &'a str,
    /// Texts of currently-visible questions, for in-prompt dedup.
    pub existing_questions: &'a [String],
    pub tenant_id: Option<&'a str>,
}

/// Strict JSON shape returned by the question generator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionBatch {
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Generator of "next question" suggestions grounded in the KB context.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(&self, req: QuestionRequest<'_>) -> ProviderResult<QuestionBatch>;
}

/// End-of-session summary generator.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, req: &SummaryRequest) -> ProviderResult<MeetingSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16, message: &str) -> ProviderError {
        ProviderError::Status {
            status,
            message: message.into(),
        }
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(status(500, "boom").is_transient());
        assert!(status(503, "unavailable").is_transient());
        assert!(status(429, "slow down").is_transient());
    }

    #[test]
    fn plain_4xx_is_terminal() {
        assert!(!status(400, "bad request").is_transient());
        assert!(!status(401, "unauthorized").is_transient());
        assert!(!status(404, "no such model").is_transient());
    }

    #[test]
    fn known_transient_4xx_markers_are_retryable() {
        assert!(status(400, "Something went wrong with your upload").is_transient());
        assert!(status(400, "there was a temporary issue").is_transient());
        assert!(status(408, "request timeout").is_transient());
        assert!(status(400, "error reading your request").is_transient());
    }

    #[test]
    fn missing_key_and_parse_are_terminal() {
        assert!(!ProviderError::MissingKey.is_transient());
        assert!(!ProviderError::Parse("bad json".into()).is_transient());
    }
}
