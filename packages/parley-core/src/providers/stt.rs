//! HTTP speech-to-text client.
//!
//! Talks to an OpenAI-compatible `/audio/transcriptions` endpoint with
//! multipart WAV uploads and `verbose_json` responses. The diarized model is
//! used for the full-audio pass; the streaming model for live windows.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;

use super::keys::ApiKeys;
use super::{ProviderError, ProviderResult, SpeechToText, TranscribeOptions, VerboseTranscription};

/// Default endpoint base for the transcription provider.
pub const DEFAULT_STT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model for live streaming windows (latency over features).
pub const DEFAULT_STREAMING_MODEL: &str = "whisper-1";

/// Default diarization-capable model for the full-audio pass.
pub const DEFAULT_DIARIZED_MODEL: &str = "whisper-1";

/// Configuration for the HTTP STT client.
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub base_url: String,
    pub streaming_model: String,
    pub diarized_model: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_STT_BASE_URL.to_string(),
            streaming_model: DEFAULT_STREAMING_MODEL.to_string(),
            diarized_model: DEFAULT_DIARIZED_MODEL.to_string(),
        }
    }
}

/// Speech-to-text over an OpenAI-compatible transcription endpoint.
pub struct HttpSpeechToText {
    client: Client,
    keys: Arc<ApiKeys>,
    config: SttConfig,
}

impl HttpSpeechToText {
    /// Creates a client sharing the bootstrap HTTP connection pool.
    pub fn new(client: Client, keys: Arc<ApiKeys>, config: SttConfig) -> Self {
        Self {
            client,
            keys,
            config,
        }
    }
}

#[async_trait]
impl SpeechToText for HttpSpeechToText {
    async fn transcribe_wav(
        &self,
        wav: Vec<u8>,
        opts: &TranscribeOptions,
    ) -> ProviderResult<VerboseTranscription> {
        let key = self
            .keys
            .for_tenant(opts.tenant_id.as_deref())
            .await
            .ok_or(ProviderError::MissingKey)?;

        let model = if opts.diarize {
            &self.config.diarized_model
        } else {
            &self.config.streaming_model
        };

        let mut form = Form::new()
            .text("model", model.clone())
            .text("response_format", "verbose_json");
        if opts.diarize {
            // Segment-level timestamps plus the provider's auto chunking hint
            form = form
                .text("timestamp_granularities[]", "segment")
                .text("chunking_strategy", "auto");
        }
        if let Some(language) = &opts.language {
            form = form.text("language", language.clone());
        }
        form = form.part(
            "file",
            Part::bytes(wav)
                .file_name("audio.wav")
                .mime_str("audio/wav")?,
        );

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.config.base_url))
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<VerboseTranscription>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    fn is_configured(&self) -> bool {
        self.keys.has_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_response_parses_segments_and_speakers() {
        let json = r#"{
            "text": "hello world",
            "language": "en",
            "duration": 4.2,
            "segments": [
                {"start": 0.0, "end": 2.1, "text": "hello", "speaker": 0},
                {"start": 2.1, "end": 4.2, "text": "world"}
            ]
        }"#;
        let parsed: VerboseTranscription = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.text, "hello world");
        assert_eq!(parsed.language.as_deref(), Some("en"));
        assert_eq!(parsed.segments.len(), 2);
        assert_eq!(parsed.segments[0].speaker, Some(0));
        assert_eq!(parsed.segments[1].speaker, None);
    }

    #[test]
    fn minimal_response_parses_with_defaults() {
        let parsed: VerboseTranscription = serde_json::from_str(r#"{"text": "hi"}"#).unwrap();
        assert_eq!(parsed.text, "hi");
        assert_eq!(parsed.duration, 0.0);
        assert!(parsed.segments.is_empty());
    }
}
