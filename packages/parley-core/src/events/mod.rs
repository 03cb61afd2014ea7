//! Event system for real-time client communication.
//!
//! This module provides:
//! - [`SessionEvent`], the server-to-client messages of the attach channel
//! - [`EventEmitter`] trait for observing events independently of transport
//!
//! Delivery to the attached socket itself goes through the session registry's
//! socket handle; the emitter is a secondary sink (logging, tests).

mod emitter;

pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::model::SuggestedQuestion;

/// Client-facing view of a suggested question.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    pub answered: bool,
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answered_at: Option<u64>,
}

impl From<&SuggestedQuestion> for QuestionView {
    fn from(q: &SuggestedQuestion) -> Self {
        Self {
            id: q.id.clone(),
            text: q.text.clone(),
            answered: q.answered,
            created_at: q.created_at,
            answered_at: q.answered_at,
        }
    }
}

/// Messages sent to the attached client over the bidirectional channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SessionEvent {
    /// Sent after a successful join.
    SessionStatus { status: String, message: String },
    /// Periodic recording progress, at most every 5 s while audio flows.
    RecordingStatus {
        audio_size_mb: f64,
        audio_chunks: u64,
        estimated_duration_seconds: f64,
        message: String,
    },
    /// One streaming partial transcript window.
    Transcription {
        text: String,
        is_final: bool,
        timestamp: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        speaker: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        speaker_id: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        language_code: Option<String>,
    },
    /// Initial/seed suggestion set with its grounding context.
    Suggestion {
        questions: Vec<QuestionView>,
        context: String,
        topics: Vec<String>,
        timestamp: u64,
    },
    /// Visible question list after a rolling or replacement update.
    SuggestedQuestionsUpdated { questions: Vec<QuestionView> },
    /// Emitted when the inactivity watchdog stops the session.
    SessionAutoStopped {
        reason: String,
        ended_at: u64,
        total_duration: u64,
    },
    /// Failure surfaced to the client with a stable machine-readable code.
    Error { message: String, code: String },
    /// Reply to a client ping.
    Pong { timestamp: u64 },
}
