//! Domain entities persisted through the repositories.
//!
//! `Session` and `Transcript` are the two entities the orchestrator mutates;
//! the rest (decks, theses, messages, documents, organizations) are read-only
//! knowledge-base inputs owned by other parts of the product.

use serde::{Deserialize, Serialize};

use crate::utils::now_millis;

/// Lifecycle status of a meeting session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session is live and accepting audio.
    #[default]
    Active,
    /// Session was stopped (explicitly or by the watchdog); finalization may
    /// still be in flight.
    Ended,
    /// Finalization hit an unrecoverable error. Terminal.
    Failed,
}

/// State of the end-of-session summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryState {
    /// No summary work has started.
    #[default]
    Pending,
    /// The summarizer is running.
    Generating,
    /// A summary (AI-generated or deterministic fallback) is persisted.
    Completed,
    /// Summary generation failed terminally.
    Failed,
}

/// A "next question" suggestion embedded in a session.
///
/// `answered` and `deleted` are write-once true. The visible list is all
/// questions with `deleted = false`, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedQuestion {
    pub id: String,
    pub text: String,
    pub answered: bool,
    pub deleted: bool,
    /// Unix timestamp in milliseconds.
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answered_at: Option<u64>,
}

impl SuggestedQuestion {
    /// Creates a fresh, unanswered, visible question.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            answered: false,
            deleted: false,
            created_at: now_millis(),
            answered_at: None,
        }
    }
}

/// One meeting. Created by the control API, mutated by the orchestrator and
/// the finalization pipeline, never deleted (soft-deactivated).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub deck_id: String,
    pub tenant_id: String,
    pub owner_id: String,
    pub title: String,
    pub status: SessionStatus,
    /// Unix timestamp in milliseconds.
    pub started_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    pub transcript_count: u64,
    pub suggestion_count: u64,
    pub detected_languages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub summary_state: SummaryState,
    pub suggested_questions: Vec<SuggestedQuestion>,
    /// Soft-delete flag; sessions are never removed from the store.
    #[serde(default)]
    pub deactivated: bool,
}

impl Session {
    /// Creates a new active session for a deck.
    pub fn new(
        deck_id: impl Into<String>,
        tenant_id: impl Into<String>,
        owner_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            deck_id: deck_id.into(),
            tenant_id: tenant_id.into(),
            owner_id: owner_id.into(),
            title: title.into(),
            status: SessionStatus::Active,
            started_at: now_millis(),
            ended_at: None,
            duration_seconds: None,
            transcript_count: 0,
            suggestion_count: 0,
            detected_languages: Vec::new(),
            summary: None,
            summary_state: SummaryState::Pending,
            suggested_questions: Vec::new(),
            deactivated: false,
        }
    }

    /// Visible questions (not deleted), newest first.
    pub fn visible_questions(&self) -> Vec<&SuggestedQuestion> {
        let mut visible: Vec<&SuggestedQuestion> =
            self.suggested_questions.iter().filter(|q| !q.deleted).collect();
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        visible
    }

    /// Marks the session ended at `ended_at_ms`, deriving `duration_seconds`.
    pub fn mark_ended(&mut self, ended_at_ms: u64) {
        let ended_at_ms = ended_at_ms.max(self.started_at);
        self.status = SessionStatus::Ended;
        self.ended_at = Some(ended_at_ms);
        self.duration_seconds = Some((ended_at_ms - self.started_at) / 1000);
    }
}

/// One utterance fragment.
///
/// `is_final = true` entries come from the authoritative full-audio pass and
/// are immutable; `is_final = false` entries are best-effort live windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub session_id: String,
    pub deck_id: String,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<i32>,
    pub is_final: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

/// The subject document of a meeting (a pitch deck) with its prior analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: String,
    pub tenant_id: String,
    pub owner_id: String,
    pub title: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_version: Option<u32>,
    /// Structured analysis output from the document analyzer, kept opaque.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<serde_json::Value>,
}

/// Content of a firm's thesis profile.
///
/// Stores either the structured profile or the raw source text; the
/// structured form is preferred wherever both could apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ThesisContent {
    Structured(serde_json::Value),
    RawText(String),
}

/// A firm's structured investment-preferences profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thesis {
    pub id: String,
    pub tenant_id: String,
    pub content: ThesisContent,
}

/// A prior Q&A turn about a deck (user query plus AI response).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub deck_id: String,
    pub user_query: String,
    pub ai_response: String,
    pub created_at: u64,
}

/// A document uploaded in support of a deck.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportingDocument {
    pub id: String,
    pub deck_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A categorized data-room document with its AI summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRoomDocument {
    pub id: String,
    pub deck_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
}

/// A tenant organization. Carries the AES-256-GCM encrypted provider key,
/// if the tenant has configured one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    /// salt ‖ nonce ‖ ciphertext+tag, see [`crate::providers::keys::KeyVault`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_provider_key: Option<Vec<u8>>,
}
