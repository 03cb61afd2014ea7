//! Centralized error types for the Parley core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses
//!
//! The machine-readable codes returned by [`ParleyError::code`] are part of
//! the client contract: the attach channel surfaces them verbatim in `error`
//! messages.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::providers::ProviderError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the Parley server.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Requested session does not exist.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session exists but is no longer active (ended or failed).
    #[error("Session is not active: {0}")]
    SessionInactive(String),

    /// Client sent an invalid or malformed session request.
    #[error("Invalid session request: {0}")]
    InvalidSession(String),

    /// Requested suggested question does not exist on the session.
    #[error("Question not found: {0}")]
    QuestionNotFound(String),

    /// Requested deck does not exist.
    #[error("Deck not found: {0}")]
    DeckNotFound(String),

    /// No transcription/generation provider key is configured.
    #[error("Provider API key missing")]
    ProviderKeyMissing,

    /// Transcription provider failed terminally.
    #[error("Transcription failed: {0}")]
    Transcription(String),

    /// Generative provider (questions, summary) failed terminally.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Session audio is too short for the full-audio pass.
    #[error("Audio too short: {seconds:.2}s")]
    AudioTooShort {
        /// Duration of the available audio in seconds.
        seconds: f64,
    },

    /// Persistence layer error.
    #[error("Repository error: {0}")]
    Repository(String),

    /// Internal invariant violation.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Server configuration error (missing required settings).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ParleyError {
    /// Returns a machine-readable error code for API responses.
    ///
    /// Codes for session/provider failures match the attach-channel contract.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::SessionInactive(_) => "SESSION_INACTIVE",
            Self::InvalidSession(_) => "INVALID_SESSION",
            Self::QuestionNotFound(_) => "QUESTION_NOT_FOUND",
            Self::DeckNotFound(_) => "DECK_NOT_FOUND",
            Self::ProviderKeyMissing => "PROVIDER_KEY_MISSING",
            Self::Transcription(_) => "TRANSCRIPTION_ERROR",
            Self::Generation(_) => "GENERATION_ERROR",
            Self::AudioTooShort { .. } => "AUDIO_TOO_SHORT",
            Self::Repository(_) => "REPOSITORY_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) | Self::QuestionNotFound(_) | Self::DeckNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::SessionInactive(_) => StatusCode::CONFLICT,
            Self::InvalidSession(_) | Self::AudioTooShort { .. } => StatusCode::BAD_REQUEST,
            Self::ProviderKeyMissing | Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ErrorCode for ParleyError {
    fn code(&self) -> &'static str {
        ParleyError::code(self)
    }
}

/// Convenient Result alias for application-wide operations.
pub type ParleyResult<T> = Result<T, ParleyError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for ParleyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ProviderError> for ParleyError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::MissingKey => Self::ProviderKeyMissing,
            other => Self::Transcription(other.to_string()),
        }
    }
}
