//! Fakes shared by the integration tests. No network, no database.

#![allow(dead_code)]

use async_trait::async_trait;
use pms_agentic::error::{AgenticError, Result};
use pms_agentic::executor::{QueryExecutor, QueryOutcome};
use pms_agentic::explainer::Explainer;
use pms_agentic::history::{
    ChatSession, ContextEntry, ConversationHistory, ConversationMessage, ConversationStore, NewMessage, NewSession,
    SessionList, StoredError,
};
use pms_agentic::llm::{CompletionProvider, CompletionRequest};
use pms_agentic::orchestrator::AgenticService;
use pms_agentic::result_set::ResultSet;
use pms_agentic::schema_rag::Embedder;
use pms_agentic::schema_registry::SchemaRegistry;
use pms_agentic::sql_generator::SqlGenerator;
use pms_agentic::sql_safety::SqlSafetyValidator;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Answers by prompt kind: SQL generation pops scripted SQL, the safety
/// check answers `safety_reply`, anything else is an explanation.
pub struct FakeLlm {
    sql_responses: Vec<String>,
    safety_reply: String,
    fail_generation: bool,
    pub generation_calls: AtomicUsize,
    pub safety_calls: AtomicUsize,
    pub explain_calls: AtomicUsize,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeLlm {
    pub fn new(sql_responses: &[&str]) -> Self {
        Self {
            sql_responses: sql_responses.iter().map(|s| s.to_string()).collect(),
            safety_reply: "SAFE: read-only SELECT".to_string(),
            fail_generation: false,
            generation_calls: AtomicUsize::new(0),
            safety_calls: AtomicUsize::new(0),
            explain_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_generation() -> Self {
        Self {
            fail_generation: true,
            ..Self::new(&[])
        }
    }

    pub fn with_safety_reply(mut self, reply: &str) -> Self {
        self.safety_reply = reply.to_string();
        self
    }

    pub fn total_calls(&self) -> usize {
        self.generation_calls.load(Ordering::SeqCst)
            + self.safety_calls.load(Ordering::SeqCst)
            + self.explain_calls.load(Ordering::SeqCst)
    }

    pub fn generation_requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.system_prompt.contains("DATABASE SCHEMA"))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CompletionProvider for FakeLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());

        if request.system_prompt.contains("DATABASE SCHEMA") {
            let n = self.generation_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_generation {
                return Err(AgenticError::Llm("connection reset".to_string()));
            }
            let idx = n.min(self.sql_responses.len().saturating_sub(1));
            return self
                .sql_responses
                .get(idx)
                .cloned()
                .ok_or_else(|| AgenticError::Llm("no scripted SQL".to_string()));
        }

        if request.user_prompt.starts_with("Analyze this SQL query") {
            self.safety_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(self.safety_reply.clone());
        }

        self.explain_calls.fetch_add(1, Ordering::SeqCst);
        Ok("Asha Rao has the most pending tickets.".to_string())
    }
}

pub struct FakeExecutor {
    rows: ResultSet,
    failure: Option<String>,
    connected: bool,
    pub calls: AtomicUsize,
    pub executed: Mutex<Vec<String>>,
}

impl FakeExecutor {
    pub fn returning(rows: ResultSet) -> Self {
        Self {
            rows,
            failure: None,
            connected: true,
            calls: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            connected: false,
            ..Self::returning(ResultSet::default())
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryExecutor for FakeExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.executed.lock().unwrap().push(sql.to_string());
        match &self.failure {
            Some(message) => Err(AgenticError::Execution(message.clone())),
            None => Ok(QueryOutcome {
                rows: self.rows.clone(),
                elapsed_ms: 4.2,
            }),
        }
    }

    async fn ping(&self) -> bool {
        self.connected
    }
}

/// In-memory conversation store. `broken` makes every call fail.
#[derive(Default)]
pub struct FakeStore {
    broken: bool,
    pub sessions: Mutex<BTreeMap<String, ChatSession>>,
    pub messages: Mutex<Vec<ConversationMessage>>,
    pub context: Mutex<Vec<ContextEntry>>,
    pub errors: Mutex<Vec<StoredError>>,
}

impl FakeStore {
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    fn check(&self) -> Result<()> {
        if self.broken {
            Err(AgenticError::History("Database is not connected".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ConversationStore for FakeStore {
    async fn create_session(&self, session: &NewSession) -> Result<ChatSession> {
        self.check()?;
        let now = chrono::Utc::now();
        let mut sessions = self.sessions.lock().unwrap();
        let entry = sessions.entry(session.session_id.clone()).or_insert_with(|| ChatSession {
            id: session.session_id.clone(),
            user_id: session.user_id,
            title: session.title.clone(),
            created_at: now,
            updated_at: now,
            message_count: 0,
            is_active: true,
        });
        entry.title = session.title.clone();
        entry.updated_at = now;
        Ok(entry.clone())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>> {
        self.check()?;
        Ok(self.sessions.lock().unwrap().get(session_id).cloned())
    }

    async fn list_sessions(&self, user_id: Option<i64>, limit: u32) -> Result<SessionList> {
        self.check()?;
        let sessions: Vec<ChatSession> = self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| user_id.map_or(true, |u| s.user_id == Some(u)))
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(SessionList {
            total_count: sessions.len(),
            sessions,
        })
    }

    async fn add_message(&self, message: NewMessage) -> Result<ConversationMessage> {
        self.check()?;
        if let Some(session) = self.sessions.lock().unwrap().get_mut(&message.session_id) {
            session.message_count += 1;
        }
        let mut messages = self.messages.lock().unwrap();
        let stored = ConversationMessage {
            id: messages.len() as i64 + 1,
            session_id: message.session_id,
            message_type: message.message_type,
            content: message.content,
            query: message.query,
            sql_query: message.sql_query,
            result_count: message.result_count,
            execution_time_ms: message.execution_time_ms,
            chart_config: message.chart_config,
            metadata: message.metadata,
            created_at: chrono::Utc::now(),
        };
        messages.push(stored.clone());
        Ok(stored)
    }

    async fn get_history(&self, session_id: &str, limit: u32) -> Result<Option<ConversationHistory>> {
        let Some(session) = self.get_session(session_id).await? else {
            return Ok(None);
        };
        let messages = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.session_id == session_id)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(Some(ConversationHistory { session, messages }))
    }

    async fn save_context(&self, session_id: &str, key: &str, value: &str) -> Result<ContextEntry> {
        self.check()?;
        let now = chrono::Utc::now();
        let mut context = self.context.lock().unwrap();
        context.retain(|c| !(c.session_id == session_id && c.context_key == key));
        let entry = ContextEntry {
            id: context.len() as i64 + 1,
            session_id: session_id.to_string(),
            context_key: key.to_string(),
            context_value: value.to_string(),
            created_at: now,
            updated_at: now,
        };
        context.push(entry.clone());
        Ok(entry)
    }

    async fn get_context(&self, session_id: &str, key: &str) -> Result<Option<ContextEntry>> {
        self.check()?;
        Ok(self
            .context
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.session_id == session_id && c.context_key == key)
            .cloned())
    }

    async fn get_all_context(&self, session_id: &str) -> Result<BTreeMap<String, String>> {
        self.check()?;
        Ok(self
            .context
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.session_id == session_id)
            .map(|c| (c.context_key.clone(), c.context_value.clone()))
            .collect())
    }

    async fn store_error(&self, session_id: &str, error_message: &str) -> Result<StoredError> {
        self.check()?;
        let mut errors = self.errors.lock().unwrap();
        let stored = StoredError {
            id: errors.len() as i64 + 1,
            error: format!("{}: {}", session_id, error_message),
        };
        errors.push(stored.clone());
        Ok(stored)
    }
}

/// Three-axis embedding keyed on words only one fallback table contains.
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.to_lowercase();
        Ok(vec![
            text.contains("hitticket") as u8 as f32,
            text.contains("department") as u8 as f32,
            0.1,
        ])
    }

    fn dimensions(&self) -> usize {
        3
    }
}

pub fn pending_by_user_rows() -> ResultSet {
    ResultSet::from_columns(
        &["user_name", "pending_tickets"],
        vec![
            vec![json!("Asha Rao"), json!(4)],
            vec![json!("Ravi Kumar"), json!(2)],
            vec![json!("Meera Iyer"), json!(0)],
        ],
    )
}

pub fn service(llm: Arc<FakeLlm>, executor: Arc<FakeExecutor>) -> AgenticService {
    let registry = Arc::new(SchemaRegistry::fallback());
    AgenticService::new(
        SqlGenerator::new(llm.clone(), registry),
        SqlSafetyValidator::new(llm.clone()),
        executor,
        Explainer::new(llm),
    )
}
