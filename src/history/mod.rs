//! Conversation history
//!
//! Chat sessions, their messages, per-session key/value context and failed
//! turns. The pipeline writes here best-effort; the HTTP surface reads it.

pub mod mysql;

pub use mysql::MySqlConversationStore;

use crate::error::{AgenticError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_SESSION_LIMIT: u32 = 50;
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    User,
    Assistant,
    System,
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::User => "user",
            MessageType::Assistant => "assistant",
            MessageType::System => "system",
            MessageType::Error => "error",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = AgenticError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(MessageType::User),
            "assistant" => Ok(MessageType::Assistant),
            "system" => Ok(MessageType::System),
            "error" => Ok(MessageType::Error),
            other => Err(AgenticError::History(format!("Unknown message type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub user_id: Option<i64>,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionList {
    pub sessions: Vec<ChatSession>,
    pub total_count: usize,
}

/// Message to append to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub session_id: String,
    pub message_type: MessageType,
    pub content: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub sql_query: Option<String>,
    #[serde(default)]
    pub result_count: Option<i64>,
    #[serde(default)]
    pub execution_time_ms: Option<f64>,
    #[serde(default)]
    pub chart_config: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl NewMessage {
    pub fn new(session_id: impl Into<String>, message_type: MessageType, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message_type,
            content: content.into(),
            query: None,
            sql_query: None,
            result_count: None,
            execution_time_ms: None,
            chart_config: None,
            metadata: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_sql(mut self, sql: Option<String>) -> Self {
        self.sql_query = sql;
        self
    }

    pub fn with_results(mut self, result_count: usize, execution_time_ms: f64) -> Self {
        self.result_count = Some(result_count as i64);
        self.execution_time_ms = Some(execution_time_ms);
        self
    }

    pub fn with_chart(mut self, chart_config: Option<Value>) -> Self {
        self.chart_config = chart_config;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: i64,
    pub session_id: String,
    pub message_type: MessageType,
    pub content: String,
    pub query: Option<String>,
    pub sql_query: Option<String>,
    pub result_count: Option<i64>,
    pub execution_time_ms: Option<f64>,
    pub chart_config: Option<Value>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationHistory {
    pub session: ChatSession,
    pub messages: Vec<ConversationMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub id: i64,
    pub session_id: String,
    pub context_key: String,
    pub context_value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredError {
    pub id: i64,
    pub error: String,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Creates the session, or refreshes its title when the id exists.
    async fn create_session(&self, session: &NewSession) -> Result<ChatSession>;

    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>>;

    /// Active sessions, most recently updated first.
    async fn list_sessions(&self, user_id: Option<i64>, limit: u32) -> Result<SessionList>;

    /// Appends a message and bumps the session's message count.
    async fn add_message(&self, message: NewMessage) -> Result<ConversationMessage>;

    /// `None` when the session does not exist. Messages oldest first.
    async fn get_history(&self, session_id: &str, limit: u32) -> Result<Option<ConversationHistory>>;

    async fn save_context(&self, session_id: &str, key: &str, value: &str) -> Result<ContextEntry>;

    async fn get_context(&self, session_id: &str, key: &str) -> Result<Option<ContextEntry>>;

    async fn get_all_context(&self, session_id: &str) -> Result<BTreeMap<String, String>>;

    async fn store_error(&self, session_id: &str, error_message: &str) -> Result<StoredError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_round_trips_through_text() {
        for kind in [MessageType::User, MessageType::Assistant, MessageType::System, MessageType::Error] {
            assert_eq!(kind.as_str().parse::<MessageType>().unwrap(), kind);
        }
        assert!("bot".parse::<MessageType>().is_err());
        assert_eq!(serde_json::to_value(MessageType::Assistant).unwrap(), "assistant");
    }

    #[test]
    fn test_new_message_builder() {
        let message = NewMessage::new("s1", MessageType::Assistant, "Found 3 results")
            .with_query("pending tickets")
            .with_sql(Some("SELECT 1".to_string()))
            .with_results(3, 12.5);
        assert_eq!(message.result_count, Some(3));
        assert_eq!(message.sql_query.as_deref(), Some("SELECT 1"));
        assert!(message.chart_config.is_none());
    }

    #[test]
    fn test_new_message_deserialises_with_defaults() {
        let message: NewMessage = serde_json::from_str(
            r#"{"session_id": "s1", "message_type": "user", "content": "hi"}"#,
        )
        .unwrap();
        assert_eq!(message.message_type, MessageType::User);
        assert!(message.query.is_none());
    }
}
