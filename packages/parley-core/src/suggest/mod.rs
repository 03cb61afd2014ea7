//! Rolling "next question" suggestions.
//!
//! The engine assembles the KB context, asks the generator for a strict JSON
//! batch, and de-duplicates candidates against the visible question list by
//! normalized word-set Jaccard similarity before head-inserting survivors.
//! Rate limiting and trigger evaluation live in the orchestrator; the logic
//! here is pure aside from repository reads.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::ParleyResult;
use crate::kb::{assemble_context, KbInputs};
use crate::model::{Session, SuggestedQuestion};
use crate::protocol_constants::QUESTION_DUP_THRESHOLD;
use crate::providers::{QuestionBatch, QuestionGenerator, QuestionRequest};
use crate::repos::Repositories;
use crate::utils::now_millis;

/// Words ignored when comparing candidate questions.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "do", "does", "did",
    "have", "has", "had", "will", "would", "can", "could", "should", "what", "which", "who",
    "whom", "when", "where", "why", "how", "this", "that", "these", "those", "of", "in", "on",
    "for", "to", "with", "about", "and", "or", "it", "its", "you", "your", "they", "their",
    "there",
];

/// Lowercases, maps punctuation to spaces, and collapses whitespace.
pub fn normalize(text: &str) -> String {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn content_words(normalized: &str) -> HashSet<&str> {
    normalized
        .split_whitespace()
        // Single letters are contraction residue from punctuation stripping
        .filter(|w| w.len() > 1 && !STOP_WORDS.contains(w))
        .collect()
}

/// Word-set Jaccard similarity of two already-normalized texts, ignoring
/// stop words.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let set_a = content_words(a);
    let set_b = content_words(b);
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Whether a candidate duplicates any existing question.
pub fn is_duplicate<'a>(candidate: &str, existing: impl Iterator<Item = &'a str>) -> bool {
    let normalized = normalize(candidate);
    for other in existing {
        if jaccard(&normalized, &normalize(other)) >= QUESTION_DUP_THRESHOLD {
            return true;
        }
    }
    false
}

/// Filters a candidate batch: drops in-batch exact-normalized duplicates and
/// candidates similar to any existing question. Order is preserved.
pub fn filter_candidates(candidates: Vec<String>, existing: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::new();
    for candidate in candidates {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            continue;
        }
        let normalized = normalize(trimmed);
        if normalized.is_empty() || !seen.insert(normalized) {
            continue;
        }
        if is_duplicate(trimmed, existing.iter().map(String::as_str)) {
            continue;
        }
        kept.push(trimmed.to_string());
    }
    kept
}

/// Outcome of one engine invocation.
pub struct SuggestionUpdate {
    /// The generator's batch (context and topics included).
    pub batch: QuestionBatch,
    /// Questions that survived de-duplication, in generator order.
    pub added: Vec<SuggestedQuestion>,
}

/// Suggestion engine over the generator and the knowledge base.
pub struct SuggestionEngine {
    generator: Arc<dyn QuestionGenerator>,
    repos: Repositories,
}

impl SuggestionEngine {
    pub fn new(generator: Arc<dyn QuestionGenerator>, repos: Repositories) -> Self {
        Self { generator, repos }
    }

    /// Loads KB inputs for a deck and formats the context string.
    pub async fn assemble_kb(&self, deck_id: &str, tenant_id: &str) -> ParleyResult<String> {
        let deck = self.repos.decks.get(deck_id).await?;
        let thesis = self.repos.theses.get_for_tenant(tenant_id).await?;
        let messages = self.repos.messages.list_for_deck(deck_id).await?;
        let supporting = self.repos.documents.supporting_for_deck(deck_id).await?;
        let dataroom = self.repos.documents.dataroom_for_deck(deck_id).await?;
        Ok(assemble_context(&KbInputs {
            deck: deck.as_ref(),
            thesis: thesis.as_ref(),
            messages: &messages,
            supporting: &supporting,
            dataroom: &dataroom,
        }))
    }

    /// Concatenated text of transcript entries within the rolling window.
    pub async fn recent_transcript_text(
        &self,
        session_id: &str,
        since_ms: u64,
    ) -> ParleyResult<String> {
        let entries = self.repos.transcripts.list_since(session_id, since_ms).await?;
        Ok(entries
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" "))
    }

    /// Runs the generator and returns the de-duplicated additions without
    /// mutating the session. The caller commits under the session's
    /// mutation lock.
    pub async fn generate(
        &self,
        session: &Session,
        kb_context: &str,
        recent_transcript: &str,
    ) -> ParleyResult<SuggestionUpdate> {
        let existing: Vec<String> = session
            .visible_questions()
            .iter()
            .map(|q| q.text.clone())
            .collect();
        let batch = self
            .generator
            .generate(QuestionRequest {
                kb_context,
                recent_transcript,
                existing_questions: &existing,
                tenant_id: Some(&session.tenant_id),
            })
            .await
            .map_err(|e| crate::error::ParleyError::Generation(e.to_string()))?;

        let kept = filter_candidates(batch.questions.clone(), &existing);
        let added = kept.into_iter().map(SuggestedQuestion::new).collect();
        Ok(SuggestionUpdate { batch, added })
    }

    /// Head-inserts new questions, preserving the existing tail, and bumps
    /// the session's suggestion counter. Returns whether anything changed.
    pub fn apply_head_insert(session: &mut Session, added: Vec<SuggestedQuestion>) -> bool {
        if added.is_empty() {
            return false;
        }
        let count = added.len() as u64;
        let mut questions = added;
        questions.append(&mut session.suggested_questions);
        session.suggested_questions = questions;
        session.suggestion_count += count;
        true
    }

    /// Replacement placement after a question is answered: the first new
    /// question takes the answered question's slot, extras are prepended.
    pub fn apply_replacement(
        session: &mut Session,
        answered_id: &str,
        added: Vec<SuggestedQuestion>,
    ) -> bool {
        if added.is_empty() {
            return false;
        }
        let count = added.len() as u64;
        let mut iter = added.into_iter();
        let first = iter.next().expect("non-empty");
        let extras: Vec<SuggestedQuestion> = iter.collect();

        match session
            .suggested_questions
            .iter()
            .position(|q| q.id == answered_id)
        {
            Some(index) => session.suggested_questions.insert(index, first),
            None => session.suggested_questions.insert(0, first),
        }
        for extra in extras.into_iter().rev() {
            session.suggested_questions.insert(0, extra);
        }
        session.suggestion_count += count;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─────────────────────────────────────────────────────────────────────────
    // Normalization and similarity
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(
            normalize("What's  your CAC, exactly?!"),
            "what s your cac exactly"
        );
    }

    #[test]
    fn jaccard_identical_is_one() {
        let n = normalize("How big is the market?");
        assert!((jaccard(&n, &n) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn jaccard_disjoint_is_zero() {
        assert_eq!(
            jaccard(&normalize("revenue growth rate"), &normalize("hiring plan details")),
            0.0
        );
    }

    #[test]
    fn stop_words_do_not_inflate_similarity() {
        // Shared words are all stop words; similarity must be 0
        let a = normalize("What is the plan?");
        let b = normalize("What is the runway?");
        assert!(jaccard(&a, &b) < QUESTION_DUP_THRESHOLD);
    }

    #[test]
    fn rephrased_question_is_detected_as_duplicate() {
        let existing = ["What is your customer acquisition cost today?".to_string()];
        assert!(is_duplicate(
            "What's your customer acquisition cost?",
            existing.iter().map(String::as_str)
        ));
    }

    #[test]
    fn unrelated_question_is_not_duplicate() {
        let existing = ["What is your customer acquisition cost?".to_string()];
        assert!(!is_duplicate(
            "How do you plan to expand into Europe?",
            existing.iter().map(String::as_str)
        ));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Batch filtering
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn filter_removes_in_batch_exact_duplicates() {
        let kept = filter_candidates(
            vec![
                "How big is the team?".into(),
                "how big is the team".into(),
                "What is the runway?".into(),
            ],
            &[],
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0], "How big is the team?");
    }

    #[test]
    fn filter_removes_near_duplicates_of_existing() {
        let existing = vec!["What is your monthly burn rate?".to_string()];
        let kept = filter_candidates(
            vec![
                "What's your monthly burn rate today?".into(),
                "Who are your main competitors?".into(),
            ],
            &existing,
        );
        assert_eq!(kept, vec!["Who are your main competitors?".to_string()]);
    }

    #[test]
    fn filter_drops_blank_candidates() {
        let kept = filter_candidates(vec!["  ".into(), "?!".into()], &[]);
        assert!(kept.is_empty());
    }

    #[test]
    fn no_two_survivors_exceed_threshold_against_existing() {
        // Soundness: after filtering, every kept candidate stays under the
        // threshold vs every existing question
        let existing = vec![
            "What is your churn?".to_string(),
            "How large is the total addressable market?".to_string(),
        ];
        let kept = filter_candidates(
            vec![
                "What churn are you seeing?".into(),
                "How large is the addressable market overall?".into(),
                "What does the sales pipeline look like?".into(),
            ],
            &existing,
        );
        for candidate in &kept {
            assert!(!is_duplicate(candidate, existing.iter().map(String::as_str)));
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Placement
    // ─────────────────────────────────────────────────────────────────────────

    fn question_with_time(text: &str, created_at: u64) -> SuggestedQuestion {
        let mut q = SuggestedQuestion::new(text);
        q.created_at = created_at;
        q
    }

    #[test]
    fn head_insert_preserves_tail() {
        let mut session = Session::new("d1", "t1", "u1", "Pitch");
        session.suggested_questions = vec![question_with_time("old", 10)];

        let changed = SuggestionEngine::apply_head_insert(
            &mut session,
            vec![SuggestedQuestion::new("new one"), SuggestedQuestion::new("new two")],
        );
        assert!(changed);
        let texts: Vec<&str> = session
            .suggested_questions
            .iter()
            .map(|q| q.text.as_str())
            .collect();
        assert_eq!(texts, vec!["new one", "new two", "old"]);
        assert_eq!(session.suggestion_count, 2);
    }

    #[test]
    fn head_insert_with_empty_batch_is_a_noop() {
        let mut session = Session::new("d1", "t1", "u1", "Pitch");
        assert!(!SuggestionEngine::apply_head_insert(&mut session, vec![]));
        assert_eq!(session.suggestion_count, 0);
    }

    #[test]
    fn replacement_takes_answered_slot_and_prepends_extras() {
        let mut session = Session::new("d1", "t1", "u1", "Pitch");
        let q1 = question_with_time("q1", 1);
        let q2 = question_with_time("q2", 2);
        let q3 = question_with_time("q3", 3);
        let answered_id = q2.id.clone();
        session.suggested_questions = vec![q1, q2, q3];

        SuggestionEngine::apply_replacement(
            &mut session,
            &answered_id,
            vec![SuggestedQuestion::new("primary"), SuggestedQuestion::new("extra")],
        );

        let texts: Vec<&str> = session
            .suggested_questions
            .iter()
            .map(|q| q.text.as_str())
            .collect();
        // Extra prepended; primary occupies q2's slot
        assert_eq!(texts, vec!["extra", "q1", "primary", "q2", "q3"]);
    }

    #[test]
    fn replacement_falls_back_to_prepend_when_slot_is_gone() {
        let mut session = Session::new("d1", "t1", "u1", "Pitch");
        session.suggested_questions = vec![question_with_time("q1", 1)];
        SuggestionEngine::apply_replacement(
            &mut session,
            "missing-id",
            vec![SuggestedQuestion::new("primary")],
        );
        assert_eq!(session.suggested_questions[0].text, "primary");
    }
}
