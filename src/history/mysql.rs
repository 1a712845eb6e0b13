//! MySQL-backed conversation store

use super::{
    ChatSession, ContextEntry, ConversationHistory, ConversationMessage, ConversationStore, MessageType, NewMessage,
    NewSession, SessionList, StoredError,
};
use crate::db::DbPool;
use crate::error::{AgenticError, Result};
use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use serde_json::Value;
use sqlx::mysql::MySqlRow;
use sqlx::types::Json;
use sqlx::Row;
use std::collections::BTreeMap;
use tracing::{debug, error};

const SESSION_COLUMNS: &str = "id, user_id, title, created_at, updated_at, message_count, is_active";
const MESSAGE_COLUMNS: &str = "id, session_id, message_type, content, query, sql_query, result_count, \
                               execution_time_ms, chart_config, metadata, created_at";
const CONTEXT_COLUMNS: &str = "id, session_id, context_key, context_value, created_at, updated_at";

/// Store over the shared pool. Without a pool every call fails with a
/// history error, which callers treat as non-fatal.
#[derive(Clone)]
pub struct MySqlConversationStore {
    pool: Option<DbPool>,
}

impl MySqlConversationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool: Some(pool) }
    }

    pub fn disconnected() -> Self {
        Self { pool: None }
    }

    fn pool(&self) -> Result<&DbPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| AgenticError::History("Database is not connected".to_string()))
    }

    async fn get_message(&self, message_id: i64) -> Result<ConversationMessage> {
        let sql = format!("SELECT {} FROM conversation_messages WHERE id = ?", MESSAGE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(message_id)
            .fetch_optional(self.pool()?)
            .await
            .map_err(history_error("fetching message"))?
            .ok_or_else(|| AgenticError::History(format!("Message {} not found", message_id)))?;
        message_from_row(&row)
    }
}

#[async_trait]
impl ConversationStore for MySqlConversationStore {
    async fn create_session(&self, session: &NewSession) -> Result<ChatSession> {
        sqlx::query(
            r#"
            INSERT INTO chat_sessions (id, user_id, title, message_count, is_active)
            VALUES (?, ?, ?, 0, 1)
            ON DUPLICATE KEY UPDATE title = VALUES(title), updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&session.session_id)
        .bind(session.user_id)
        .bind(&session.title)
        .execute(self.pool()?)
        .await
        .map_err(history_error("creating session"))?;

        debug!("Upserted chat session {}", session.session_id);
        self.get_session(&session.session_id)
            .await?
            .ok_or_else(|| AgenticError::History(format!("Session {} not found after insert", session.session_id)))
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>> {
        let sql = format!("SELECT {} FROM chat_sessions WHERE id = ?", SESSION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(session_id)
            .fetch_optional(self.pool()?)
            .await
            .map_err(history_error("getting session"))?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn list_sessions(&self, user_id: Option<i64>, limit: u32) -> Result<SessionList> {
        let rows = match user_id {
            Some(user_id) => {
                let sql = format!(
                    "SELECT {} FROM chat_sessions WHERE user_id = ? AND is_active = 1 \
                     ORDER BY updated_at DESC LIMIT ?",
                    SESSION_COLUMNS
                );
                sqlx::query(&sql).bind(user_id).bind(limit).fetch_all(self.pool()?).await
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM chat_sessions WHERE is_active = 1 ORDER BY updated_at DESC LIMIT ?",
                    SESSION_COLUMNS
                );
                sqlx::query(&sql).bind(limit).fetch_all(self.pool()?).await
            }
        }
        .map_err(history_error("listing sessions"))?;

        let sessions = rows.iter().map(session_from_row).collect::<Result<Vec<_>>>()?;
        Ok(SessionList {
            total_count: sessions.len(),
            sessions,
        })
    }

    async fn add_message(&self, message: NewMessage) -> Result<ConversationMessage> {
        let mut tx = self.pool()?.begin().await.map_err(history_error("starting transaction"))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO conversation_messages
                (session_id, message_type, content, query, sql_query, result_count,
                 execution_time_ms, chart_config, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.session_id)
        .bind(message.message_type.as_str())
        .bind(&message.content)
        .bind(&message.query)
        .bind(&message.sql_query)
        .bind(message.result_count)
        .bind(message.execution_time_ms)
        .bind(message.chart_config.as_ref().map(Json))
        .bind(message.metadata.as_ref().map(Json))
        .execute(&mut *tx)
        .await
        .map_err(history_error("adding message"))?;

        sqlx::query(
            "UPDATE chat_sessions SET message_count = message_count + 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(&message.session_id)
        .execute(&mut *tx)
        .await
        .map_err(history_error("updating message count"))?;

        tx.commit().await.map_err(history_error("committing message"))?;

        let message_id = inserted.last_insert_id() as i64;
        debug!(
            "Stored {} message {} in session {}",
            message.message_type, message_id, message.session_id
        );
        self.get_message(message_id).await
    }

    async fn get_history(&self, session_id: &str, limit: u32) -> Result<Option<ConversationHistory>> {
        let Some(session) = self.get_session(session_id).await? else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT {} FROM conversation_messages WHERE session_id = ? ORDER BY created_at ASC, id ASC LIMIT ?",
            MESSAGE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .bind(limit)
            .fetch_all(self.pool()?)
            .await
            .map_err(history_error("getting history"))?;

        let messages = rows.iter().map(message_from_row).collect::<Result<Vec<_>>>()?;
        Ok(Some(ConversationHistory { session, messages }))
    }

    async fn save_context(&self, session_id: &str, key: &str, value: &str) -> Result<ContextEntry> {
        sqlx::query(
            r#"
            INSERT INTO conversation_context (session_id, context_key, context_value)
            VALUES (?, ?, ?)
            ON DUPLICATE KEY UPDATE context_value = VALUES(context_value), updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(session_id)
        .bind(key)
        .bind(value)
        .execute(self.pool()?)
        .await
        .map_err(history_error("saving context"))?;

        self.get_context(session_id, key)
            .await?
            .ok_or_else(|| AgenticError::History(format!("Context '{}' not found after save", key)))
    }

    async fn get_context(&self, session_id: &str, key: &str) -> Result<Option<ContextEntry>> {
        let sql = format!(
            "SELECT {} FROM conversation_context WHERE session_id = ? AND context_key = ?",
            CONTEXT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(session_id)
            .bind(key)
            .fetch_optional(self.pool()?)
            .await
            .map_err(history_error("getting context"))?;
        row.as_ref().map(context_from_row).transpose()
    }

    async fn get_all_context(&self, session_id: &str) -> Result<BTreeMap<String, String>> {
        let rows = sqlx::query("SELECT context_key, context_value FROM conversation_context WHERE session_id = ?")
            .bind(session_id)
            .fetch_all(self.pool()?)
            .await
            .map_err(history_error("getting all context"))?;

        rows.iter()
            .map(|row| Ok((row.try_get("context_key")?, row.try_get("context_value")?)))
            .collect()
    }

    async fn store_error(&self, session_id: &str, error_message: &str) -> Result<StoredError> {
        let inserted = sqlx::query("INSERT INTO conversation_errors (session_id, error_message) VALUES (?, ?)")
            .bind(session_id)
            .bind(error_message)
            .execute(self.pool()?)
            .await
            .map_err(history_error("storing error"))?;

        Ok(StoredError {
            id: inserted.last_insert_id() as i64,
            error: error_message.to_string(),
        })
    }
}

fn history_error(action: &'static str) -> impl Fn(sqlx::Error) -> AgenticError {
    move |e| {
        error!("Error {}: {}", action, e);
        AgenticError::History(format!("Error {}: {}", action, e))
    }
}

fn session_from_row(row: &MySqlRow) -> Result<ChatSession> {
    Ok(ChatSession {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        message_count: row.try_get("message_count")?,
        is_active: row.try_get("is_active")?,
    })
}

fn message_from_row(row: &MySqlRow) -> Result<ConversationMessage> {
    let message_type: String = row.try_get("message_type")?;
    Ok(ConversationMessage {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        message_type: message_type.parse::<MessageType>()?,
        content: row.try_get("content")?,
        query: row.try_get("query")?,
        sql_query: row.try_get("sql_query")?,
        result_count: row.try_get("result_count")?,
        execution_time_ms: float_column(row, "execution_time_ms"),
        chart_config: json_column(row, "chart_config"),
        metadata: json_column(row, "metadata"),
        created_at: row.try_get("created_at")?,
    })
}

fn context_from_row(row: &MySqlRow) -> Result<ContextEntry> {
    Ok(ContextEntry {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        context_key: row.try_get("context_key")?,
        context_value: row.try_get("context_value")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// `execution_time_ms` may be FLOAT, DOUBLE or DECIMAL depending on the deployment.
fn float_column(row: &MySqlRow, column: &str) -> Option<f64> {
    row.try_get::<Option<f64>, _>(column)
        .ok()
        .flatten()
        .or_else(|| row.try_get::<Option<f32>, _>(column).ok().flatten().map(f64::from))
        .or_else(|| {
            row.try_get::<Option<BigDecimal>, _>(column)
                .ok()
                .flatten()
                .and_then(|d| d.to_f64())
        })
}

/// JSON columns, or JSON text in a TEXT column. Unparseable text is dropped.
fn json_column(row: &MySqlRow, column: &str) -> Option<Value> {
    row.try_get::<Option<Json<Value>>, _>(column)
        .ok()
        .flatten()
        .map(|json| json.0)
        .or_else(|| {
            row.try_get::<Option<String>, _>(column)
                .ok()
                .flatten()
                .and_then(|text| serde_json::from_str(&text).ok())
        })
}
