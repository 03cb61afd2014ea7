//! HTTP chat-completion client backing the question generator and the
//! summarizer.
//!
//! Both generators share one OpenAI-compatible `/chat/completions` endpoint
//! with `response_format: json_object`, so responses can be parsed into the
//! strict shapes the orchestrator expects.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::keys::ApiKeys;
use super::{
    ProviderError, ProviderResult, QuestionBatch, QuestionGenerator, QuestionRequest, Summarizer,
};
use crate::summary::{build_summary_prompt, summary_system_prompt, MeetingSummary, SummaryRequest};

/// Default endpoint base for the generation provider.
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Default generation model.
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Configuration for the chat-completion client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            // Lower temperature keeps question phrasing stable across runs
            temperature: 0.3,
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

/// Chat-completion client implementing both generator traits.
pub struct ChatLlm {
    client: Client,
    keys: Arc<ApiKeys>,
    config: LlmConfig,
}

impl ChatLlm {
    /// Creates a client sharing the bootstrap HTTP connection pool.
    pub fn new(client: Client, keys: Arc<ApiKeys>, config: LlmConfig) -> Self {
        Self {
            client,
            keys,
            config,
        }
    }

    /// Runs one JSON-mode completion and returns the raw content string.
    async fn complete_json(
        &self,
        system: &str,
        user: &str,
        tenant_id: Option<&str>,
    ) -> ProviderResult<String> {
        let key = self
            .keys
            .for_tenant(tenant_id)
            .await
            .ok_or(ProviderError::MissingKey)?;

        let body = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(key)
            .json(&body)
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

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::Parse("empty choices".into()))
    }
}

/// Builds the question-generation prompt from the KB context, the recent
/// transcript window, and the currently-visible questions.
pub fn build_question_prompt(req: &QuestionRequest<'_>) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are assisting an investor during a live pitch meeting. Propose 3 to 5 \
         sharp next questions to ask the founder, grounded in the context below.\n",
    );
    prompt.push_str(
        "Return a JSON object with exactly these fields: questions (string[]), \
         context (string, one sentence on what the questions probe), topics (string[]).\n\n",
    );
    prompt.push_str("## Knowledge base\n");
    prompt.push_str(req.kb_context);
    prompt.push('\n');
    if !req.recent_transcript.is_empty() {
        prompt.push_str("\n## Recent conversation\n");
        prompt.push_str(req.recent_transcript);
        prompt.push('\n');
    }
    if !req.existing_questions.is_empty() {
        prompt.push_str("\n## Already suggested (do not repeat)\n");
        for q in req.existing_questions {
            prompt.push_str("- ");
            prompt.push_str(q);
            prompt.push('\n');
        }
    }
    prompt
}

#[async_trait]
impl QuestionGenerator for ChatLlm {
    async fn generate(&self, req: QuestionRequest<'_>) -> ProviderResult<QuestionBatch> {
        let system = "You generate incisive investor questions. Respond with a single \
                      JSON object only.";
        let user = build_question_prompt(&req);
        let content = self.complete_json(system, &user, req.tenant_id).await?;
        serde_json::from_str(&content).map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

#[async_trait]
impl Summarizer for ChatLlm {
    async fn summarize(&self, req: &SummaryRequest) -> ProviderResult<MeetingSummary> {
        let user = build_summary_prompt(req);
        let content = self
            .complete_json(summary_system_prompt(), &user, req.tenant_id.as_deref())
            .await?;
        serde_json::from_str(&content).map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_batch_parses_strict_shape() {
        let json = r#"{
            "questions": ["What drives churn?", "How big is the pipeline?"],
            "context": "Revenue quality",
            "topics": ["churn", "pipeline"]
        }"#;
        let batch: QuestionBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.questions.len(), 2);
        assert_eq!(batch.topics, vec!["churn", "pipeline"]);
    }

    #[test]
    fn question_prompt_lists_existing_questions() {
        let existing = vec!["What is your CAC?".to_string()];
        let req = QuestionRequest {
            kb_context: "Deck: Acme",
            recent_transcript: "Speaker 1: our CAC is low",
            existing_questions: &existing,
            tenant_id: None,
        };
        let prompt = build_question_prompt(&req);
        assert!(prompt.contains("Deck: Acme"));
        assert!(prompt.contains("our CAC is low"));
        assert!(prompt.contains("- What is your CAC?"));
    }

    #[test]
    fn initial_prompt_has_no_conversation_section() {
        let req = QuestionRequest {
            kb_context: "Deck: Acme",
            recent_transcript: "",
            existing_questions: &[],
            tenant_id: None,
        };
        let prompt = build_question_prompt(&req);
        assert!(!prompt.contains("## Recent conversation"));
        assert!(!prompt.contains("Already suggested"));
    }

    #[test]
    fn chat_response_extracts_first_choice() {
        let raw = r#"{"choices":[{"message":{"content":"{\"questions\":[]}"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "{\"questions\":[]}");
    }
}
