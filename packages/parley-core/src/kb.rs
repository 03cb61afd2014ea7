//! Knowledge-base context assembly.
//!
//! Formats the deck, its analysis, the firm thesis, prior Q&A turns, and
//! document inventories into one context string for the generators. The
//! formatter is pure: identical inputs yield identical output, with no
//! timestamps and no randomness.

use crate::model::{DataRoomDocument, Deck, Message, SupportingDocument, Thesis, ThesisContent};

/// Inputs gathered from the repositories for one assembly.
#[derive(Debug, Default)]
pub struct KbInputs<'a> {
    pub deck: Option<&'a Deck>,
    pub thesis: Option<&'a Thesis>,
    pub messages: &'a [Message],
    pub supporting: &'a [SupportingDocument],
    pub dataroom: &'a [DataRoomDocument],
}

fn json_block(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Builds the deterministic formatted KB context.
pub fn assemble_context(inputs: &KbInputs<'_>) -> String {
    let mut out = String::new();

    out.push_str("# Deck\n");
    match inputs.deck {
        Some(deck) => {
            out.push_str(&format!("Title: {}\n", deck.title));
            out.push_str(&format!("Status: {}\n", deck.status));
            if let Some(version) = deck.analysis_version {
                out.push_str(&format!("Analysis version: {}\n", version));
            }
            match &deck.analysis {
                Some(analysis) => {
                    out.push_str("\n## Deck analysis\n");
                    out.push_str(&json_block(analysis));
                    out.push('\n');
                }
                None => out.push_str("\nDeck analysis: Not available\n"),
            }
        }
        None => out.push_str("Not available\n"),
    }

    out.push_str("\n# Firm thesis\n");
    match inputs.thesis {
        Some(thesis) => match &thesis.content {
            ThesisContent::Structured(profile) => {
                out.push_str(&json_block(profile));
                out.push('\n');
            }
            ThesisContent::RawText(text) => {
                out.push_str(text.trim());
                out.push('\n');
            }
        },
        None => out.push_str("Not available\n"),
    }

    if !inputs.messages.is_empty() {
        out.push_str("\n# Prior discussion\n");
        for message in inputs.messages {
            out.push_str(&format!("Q: {}\n", message.user_query.trim()));
            out.push_str(&format!("A: {}\n", message.ai_response.trim()));
        }
    }

    if !inputs.supporting.is_empty() {
        out.push_str("\n# Supporting documents\n");
        for doc in inputs.supporting {
            match &doc.description {
                Some(description) => {
                    out.push_str(&format!("- {}: {}\n", doc.title, description.trim()))
                }
                None => out.push_str(&format!("- {}\n", doc.title)),
            }
        }
    }

    if !inputs.dataroom.is_empty() {
        out.push_str("\n# Data room\n");
        for doc in inputs.dataroom {
            let category = doc.category.as_deref().unwrap_or("uncategorized");
            match &doc.ai_summary {
                Some(summary) => out.push_str(&format!(
                    "- {} [{}]: {}\n",
                    doc.title,
                    category,
                    summary.trim()
                )),
                None => out.push_str(&format!("- {} [{}]\n", doc.title, category)),
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deck() -> Deck {
        Deck {
            id: "d1".into(),
            tenant_id: "t1".into(),
            owner_id: "u1".into(),
            title: "Acme Robotics".into(),
            status: "analyzed".into(),
            analysis_version: Some(3),
            analysis: Some(json!({"market": "large", "stage": "seed"})),
        }
    }

    #[test]
    fn assembly_is_deterministic() {
        let deck = deck();
        let inputs = KbInputs {
            deck: Some(&deck),
            ..Default::default()
        };
        assert_eq!(assemble_context(&inputs), assemble_context(&inputs));
    }

    #[test]
    fn includes_deck_analysis_and_version() {
        let deck = deck();
        let inputs = KbInputs {
            deck: Some(&deck),
            ..Default::default()
        };
        let out = assemble_context(&inputs);
        assert!(out.contains("Title: Acme Robotics"));
        assert!(out.contains("Analysis version: 3"));
        assert!(out.contains("\"market\": \"large\""));
    }

    #[test]
    fn absent_inputs_say_not_available() {
        let out = assemble_context(&KbInputs::default());
        assert!(out.contains("# Deck\nNot available"));
        assert!(out.contains("# Firm thesis\nNot available"));
        assert!(!out.contains("# Prior discussion"));
        assert!(!out.contains("# Data room"));
    }

    #[test]
    fn raw_text_thesis_is_used_as_fallback_form() {
        let thesis = Thesis {
            id: "th1".into(),
            tenant_id: "t1".into(),
            content: ThesisContent::RawText("  B2B SaaS, seed to A, EU.  ".into()),
        };
        let inputs = KbInputs {
            thesis: Some(&thesis),
            ..Default::default()
        };
        let out = assemble_context(&inputs);
        assert!(out.contains("# Firm thesis\nB2B SaaS, seed to A, EU.\n"));
    }

    #[test]
    fn flattens_prior_turns_and_documents() {
        let messages = vec![Message {
            id: "m1".into(),
            deck_id: "d1".into(),
            user_query: "What is the TAM?".into(),
            ai_response: "About $4B.".into(),
            created_at: 1,
        }];
        let supporting = vec![SupportingDocument {
            id: "sd1".into(),
            deck_id: "d1".into(),
            title: "Financial model".into(),
            description: Some("3-year projections".into()),
        }];
        let dataroom = vec![DataRoomDocument {
            id: "dr1".into(),
            deck_id: "d1".into(),
            title: "Cap table".into(),
            category: Some("legal".into()),
            ai_summary: Some("Clean structure".into()),
        }];
        let inputs = KbInputs {
            messages: &messages,
            supporting: &supporting,
            dataroom: &dataroom,
            ..Default::default()
        };
        let out = assemble_context(&inputs);
        assert!(out.contains("Q: What is the TAM?\nA: About $4B."));
        assert!(out.contains("- Financial model: 3-year projections"));
        assert!(out.contains("- Cap table [legal]: Clean structure"));
    }
}
