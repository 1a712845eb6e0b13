//! Explanation Generator
//!
//! Narrates a result set in plain language. Best-effort: a failed LLM call
//! yields a fixed sentence instead of an error.

use crate::llm::{CompletionProvider, CompletionRequest};
use crate::prompts::build_explanation_prompt;
use crate::result_set::ResultSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Rows included in the prompt.
pub const MAX_EXPLAINED_ROWS: usize = 10;
pub const FALLBACK_EXPLANATION: &str = "Results retrieved successfully, but explanation generation failed.";

const EXPLANATION_TEMPERATURE: f32 = 0.7;
const EXPLANATION_MAX_TOKENS: u32 = 300;

pub struct Explainer {
    llm: Arc<dyn CompletionProvider>,
}

impl Explainer {
    pub fn new(llm: Arc<dyn CompletionProvider>) -> Self {
        Self { llm }
    }

    pub async fn explain(&self, query: &str, results: &ResultSet, sql: Option<&str>) -> String {
        let total = results.len();
        let excerpt = results.head(MAX_EXPLAINED_ROWS);
        let rows_json = match serde_json::to_string_pretty(&excerpt) {
            Ok(json) => json,
            Err(e) => {
                warn!("Could not serialise rows for explanation: {}", e);
                return FALLBACK_EXPLANATION.to_string();
            }
        };

        let prompt = build_explanation_prompt(query, &rows_json, excerpt.len(), total, sql);
        let request = CompletionRequest::new("", prompt)
            .with_temperature(EXPLANATION_TEMPERATURE)
            .with_max_tokens(EXPLANATION_MAX_TOKENS);

        match self.llm.complete(request).await {
            Ok(text) => {
                debug!("Generated explanation ({} chars)", text.len());
                let mut explanation = text.trim().to_string();
                if total > MAX_EXPLAINED_ROWS {
                    explanation.push_str(&format!(
                        "\n\n(Showing {} of {} total results)",
                        MAX_EXPLAINED_ROWS, total
                    ));
                }
                explanation
            }
            Err(e) => {
                warn!("Explanation generation failed: {}", e);
                FALLBACK_EXPLANATION.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AgenticError, Result};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct RecordingLlm {
        reply: Option<String>,
        prompts: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionProvider for RecordingLlm {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.prompts.lock().unwrap().push(request);
            self.reply
                .clone()
                .ok_or_else(|| AgenticError::Llm("rate limited".to_string()))
        }
    }

    fn rows(n: usize) -> ResultSet {
        ResultSet::from_columns(
            &["user_name", "pending"],
            (0..n).map(|i| vec![json!(format!("user{}", i)), json!(i)]).collect(),
        )
    }

    #[tokio::test]
    async fn test_truncates_and_notes_total() {
        let llm = Arc::new(RecordingLlm {
            reply: Some(" Most users have few pending tickets. ".to_string()),
            prompts: Mutex::new(Vec::new()),
        });
        let explainer = Explainer::new(llm.clone());
        let text = explainer.explain("pending per user", &rows(25), Some("SELECT 1")).await;

        assert_eq!(
            text,
            "Most users have few pending tickets.\n\n(Showing 10 of 25 total results)"
        );
        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].user_prompt.contains("10 of 25 rows"));
        assert!(prompts[0].user_prompt.contains("user9"));
        assert!(!prompts[0].user_prompt.contains("user10"));
        assert_eq!(prompts[0].max_tokens, 300);
    }

    #[tokio::test]
    async fn test_small_result_has_no_note() {
        let llm = Arc::new(RecordingLlm {
            reply: Some("Three users.".to_string()),
            prompts: Mutex::new(Vec::new()),
        });
        let text = Explainer::new(llm).explain("users", &rows(3), None).await;
        assert_eq!(text, "Three users.");
    }

    #[tokio::test]
    async fn test_failure_returns_fallback() {
        let llm = Arc::new(RecordingLlm {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        });
        let text = Explainer::new(llm).explain("users", &rows(3), None).await;
        assert_eq!(text, FALLBACK_EXPLANATION);
    }
}
