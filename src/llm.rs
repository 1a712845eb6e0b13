//! LLM text-completion client
//!
//! The pipeline treats the model as an untrusted text oracle: every caller
//! parses the returned text defensively.

use crate::error::{AgenticError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One chat-completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Sent as the system message; skipped when empty.
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: 0.3,
            max_tokens: 2000,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;

    /// Whether credentials are present. Used by the health check only.
    fn is_configured(&self) -> bool {
        true
    }
}

#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            http: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        if !self.is_configured() {
            return Err(AgenticError::Llm("OpenAI API key is not configured".to_string()));
        }

        let mut messages = Vec::new();
        if !request.system_prompt.trim().is_empty() {
            messages.push(serde_json::json!({"role": "system", "content": request.system_prompt}));
        }
        messages.push(serde_json::json!({"role": "user", "content": request.user_prompt}));

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        debug!(model = %self.model, temperature = request.temperature, "Calling chat completions");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AgenticError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgenticError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AgenticError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        extract_content(&response_json)
    }

    fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Pull the first choice's message text out of a chat-completions payload.
pub(crate) fn extract_content(response_json: &serde_json::Value) -> Result<String> {
    if let Some(error) = response_json.get("error") {
        return Err(AgenticError::Llm(format!("LLM API error: {}", error)));
    }

    let choices = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| AgenticError::Llm("No choices array in LLM response".to_string()))?;

    let first = choices
        .first()
        .ok_or_else(|| AgenticError::Llm("Empty choices array in LLM response".to_string()))?;

    match first.get("finish_reason").and_then(|r| r.as_str()) {
        Some("length") => warn!("LLM response was truncated due to length limit"),
        Some("content_filter") => {
            return Err(AgenticError::Llm("LLM response was filtered by content policy".to_string()))
        }
        _ => {}
    }

    let content = first["message"]["content"]
        .as_str()
        .ok_or_else(|| AgenticError::Llm("No content in LLM response".to_string()))?;

    if content.trim().is_empty() {
        return Err(AgenticError::Llm("Empty content in LLM response".to_string()));
    }

    Ok(content.trim().to_string())
}

/// Remove a Markdown code fence (```sql, ```json, bare ```) wrapped around
/// model output. Text without a fence is returned trimmed.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let without_open = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        // single line like ```SELECT 1```
        None => trimmed
            .trim_start_matches("```sql")
            .trim_start_matches("```SQL")
            .trim_start_matches("```json")
            .trim_start_matches("```"),
    };

    without_open.trim_end().trim_end_matches("```").trim().to_string()
}

/// Verdict of the LLM safety check. Anything that is not a clear SAFE is unsafe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyVerdict {
    pub is_safe: bool,
    pub reason: String,
}

impl SafetyVerdict {
    pub fn parse(response: &str) -> Self {
        let cleaned = strip_code_fences(response);
        let text = cleaned.trim_start_matches(|c: char| c == '*' || c == '"' || c.is_whitespace());
        let upper = text.to_uppercase();

        let (is_safe, rest) = if starts_with_word(&upper, "UNSAFE") {
            (false, text.get("UNSAFE".len()..).unwrap_or(""))
        } else if starts_with_word(&upper, "SAFE") {
            (true, text.get("SAFE".len()..).unwrap_or(""))
        } else {
            return Self {
                is_safe: false,
                reason: format!("Unparseable safety response: {}", truncate(text, 200)),
            };
        };

        let reason = rest
            .trim_start_matches(|c: char| c == '*' || c == ':' || c == '-' || c == '.' || c.is_whitespace())
            .trim()
            .to_string();

        let reason = if reason.is_empty() {
            if is_safe {
                "Query is safe to execute".to_string()
            } else {
                "Query was flagged as unsafe".to_string()
            }
        } else {
            reason
        };

        Self { is_safe, reason }
    }
}

/// `word` followed by the end of text or a non-word character; SAFETY is not SAFE.
fn starts_with_word(text: &str, word: &str) -> bool {
    text.strip_prefix(word)
        .map_or(false, |rest| !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_'))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
