//! End-of-session summary contracts and rendering.
//!
//! The summarizer is asked for a JSON object of fixed shape; unknown fields
//! are preserved in an `extras` bag rather than dropped. The rendered
//! `content` string has a fixed plain-text layout, and a deterministic
//! fallback is produced when AI generation fails.

use serde::{Deserialize, Serialize};

use crate::transcribe::full::TranscribedSegment;
use crate::utils::word_count;

/// Fixed JSON shape requested from the summary generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingSummary {
    #[serde(default)]
    pub executive_summary: String,
    #[serde(default)]
    pub key_topics: Vec<String>,
    #[serde(default)]
    pub important_points: Vec<String>,
    #[serde(default)]
    pub questions_asked: Vec<String>,
    #[serde(default)]
    pub concerns_or_red_flags: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub overall_assessment: String,
    /// Fields the generator returned beyond the fixed shape.
    #[serde(flatten)]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

/// Inputs for one summary invocation.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    /// Speaker-attributed transcript, one line per segment.
    pub transcript: String,
    pub duration_seconds: u64,
    /// Speaker labels in order of first appearance.
    pub participants: Vec<String>,
    pub languages: Vec<String>,
    pub tenant_id: Option<String>,
}

/// Builds the speaker-attributed transcript and the participant list from
/// the full-audio segments.
pub fn speaker_transcript(segments: &[TranscribedSegment]) -> (String, Vec<String>) {
    let mut participants: Vec<String> = Vec::new();
    let mut lines = Vec::with_capacity(segments.len());
    for seg in segments {
        let label = seg
            .speaker
            .clone()
            .unwrap_or_else(|| "Speaker".to_string());
        if !participants.contains(&label) {
            participants.push(label.clone());
        }
        lines.push(format!("{}: {}", label, seg.text.trim()));
    }
    (lines.join("\n"), participants)
}

/// System prompt for the summary generator.
pub fn summary_system_prompt() -> &'static str {
    "You are an analyst assistant summarizing a live pitch meeting for an \
     investment team. Respond with a single JSON object only."
}

/// User prompt asking for the fixed JSON shape.
pub fn build_summary_prompt(req: &SummaryRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str("Summarize the following pitch meeting transcript.\n");
    prompt.push_str(&format!(
        "Meeting duration: {} seconds. Participants: {}.\n",
        req.duration_seconds,
        if req.participants.is_empty() {
            "unknown".to_string()
        } else {
            req.participants.join(", ")
        }
    ));
    if !req.languages.is_empty() {
        prompt.push_str(&format!("Detected languages: {}.\n", req.languages.join(", ")));
    }
    prompt.push_str(
        "Speaker labels are diarization ids; use in-transcript self-introductions \
         to attribute real names where possible.\n",
    );
    prompt.push_str(
        "Return a JSON object with exactly these fields: executiveSummary (string), \
         keyTopics (string[]), importantPoints (string[]), questionsAsked (string[]), \
         concernsOrRedFlags (string[]), nextSteps (string[]), overallAssessment (string).\n\n",
    );
    prompt.push_str("Transcript:\n");
    prompt.push_str(&req.transcript);
    prompt
}

fn push_section(out: &mut String, heading: &str, items: &[String]) {
    out.push_str(heading);
    out.push('\n');
    if items.is_empty() {
        out.push_str("- None noted\n");
    } else {
        for item in items {
            out.push_str("- ");
            out.push_str(item);
            out.push('\n');
        }
    }
    out.push('\n');
}

/// Renders the structured summary into the fixed-layout `content` text.
pub fn render_content(summary: &MeetingSummary) -> String {
    let mut out = String::new();
    out.push_str("EXECUTIVE SUMMARY\n");
    out.push_str(summary.executive_summary.trim());
    out.push_str("\n\n");
    push_section(&mut out, "KEY TOPICS", &summary.key_topics);
    push_section(&mut out, "IMPORTANT POINTS", &summary.important_points);
    push_section(&mut out, "QUESTIONS ASKED", &summary.questions_asked);
    push_section(&mut out, "CONCERNS / RED FLAGS", &summary.concerns_or_red_flags);
    push_section(&mut out, "NEXT STEPS", &summary.next_steps);
    out.push_str("OVERALL ASSESSMENT\n");
    out.push_str(summary.overall_assessment.trim());
    out.push('\n');
    out
}

/// Deterministic fallback summary used when AI generation fails.
pub fn fallback_content(duration_seconds: u64, participants: &[String], transcript: &str) -> String {
    format!(
        "MEETING SUMMARY\n\
         Duration: {} seconds\n\
         Participants: {}\n\
         Transcript word count: {}\n\n\
         AI summary generation failed; this is an automatically generated notice.\n",
        duration_seconds,
        if participants.is_empty() {
            "unknown".to_string()
        } else {
            participants.join(", ")
        },
        word_count(transcript)
    )
}

/// Deterministic summary for sessions with no detected speech.
pub fn no_speech_content(duration_seconds: u64) -> String {
    format!(
        "MEETING SUMMARY\n\
         Duration: {} seconds\n\n\
         No speech detected in the session audio.\n",
        duration_seconds
    )
}
