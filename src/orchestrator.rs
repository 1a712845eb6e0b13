//! Agentic query orchestrator
//!
//! Runs one natural-language question through validation, SQL generation,
//! the safety gate, execution, chart classification and explanation. Every
//! failure becomes a `success = false` response; nothing escapes as an error.

use crate::error::AgenticError;
use crate::executor::QueryExecutor;
use crate::explainer::Explainer;
use crate::history::{ConversationStore, MessageType, NewMessage, NewSession};
use crate::models::{AgenticQueryRequest, AgenticQueryResponse};
use crate::prompt_validator::PromptValidator;
use crate::sql_generator::SqlGenerator;
use crate::sql_safety::SqlSafetyValidator;
use crate::visualization::classify;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Session titles are the first characters of the opening question.
const SESSION_TITLE_CHARS: usize = 60;

/// A failed turn and the SQL it got as far as, if any.
struct Failure {
    sql: Option<String>,
    error: AgenticError,
}

impl From<AgenticError> for Failure {
    fn from(error: AgenticError) -> Self {
        Self { sql: None, error }
    }
}

pub struct AgenticService {
    validator: PromptValidator,
    generator: SqlGenerator,
    safety: SqlSafetyValidator,
    executor: Arc<dyn QueryExecutor>,
    explainer: Explainer,
    history: Option<Arc<dyn ConversationStore>>,
}

impl AgenticService {
    pub fn new(
        generator: SqlGenerator,
        safety: SqlSafetyValidator,
        executor: Arc<dyn QueryExecutor>,
        explainer: Explainer,
    ) -> Self {
        Self {
            validator: PromptValidator::new(),
            generator,
            safety,
            executor,
            explainer,
            history: None,
        }
    }

    pub fn with_validator(mut self, validator: PromptValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_history(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.history = Some(store);
        self
    }

    pub fn generator(&self) -> &SqlGenerator {
        &self.generator
    }

    pub fn safety(&self) -> &SqlSafetyValidator {
        &self.safety
    }

    pub fn executor(&self) -> &Arc<dyn QueryExecutor> {
        &self.executor
    }

    pub async fn process_query(&self, request: &AgenticQueryRequest) -> AgenticQueryResponse {
        let start = Instant::now();
        info!("Processing query: {}", request.query);

        let response = match self.run(request).await {
            Ok(response) => response,
            Err(Failure { sql, error }) => {
                warn!("Query failed: {}", error);
                AgenticQueryResponse::failure(&request.query, sql, failure_message(&error))
            }
        };

        if let Some(session_id) = request.session_id.as_deref().filter(|s| !s.trim().is_empty()) {
            self.record_turn(session_id, request, &response).await;
        }

        info!(
            success = response.success,
            "Query finished in {:.2}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        response
    }

    async fn run(&self, request: &AgenticQueryRequest) -> Result<AgenticQueryResponse, Failure> {
        let (is_valid, reason) = self.validator.validate(&request.query);
        if !is_valid {
            return Err(AgenticError::InputRejected(reason).into());
        }

        let generated = self.generator.generate(&request.query, request.role.as_deref()).await?;
        let sql = generated.sql;
        debug!(retries = generated.retries, used_rag = generated.used_rag, "SQL generated");

        let report = self.safety.validate(&sql).await;
        if !report.is_safe {
            warn!("Unsafe query detected: {}", report.reason);
            return Err(Failure {
                sql: Some(sql),
                error: AgenticError::ValidationRejected(report.reason),
            });
        }

        let outcome = match self.executor.execute(&sql).await {
            Ok(outcome) => outcome,
            Err(error) => return Err(Failure { sql: Some(sql), error }),
        };
        let results = outcome.rows;

        let chart_config = if results.is_empty() {
            None
        } else {
            classify(&request.query, &results, &sql)
        };
        match &chart_config {
            Some(chart) => info!("Chart recommendation: {:?}", chart.chart_type),
            None => debug!("No chart recommended, table view"),
        }

        let explanation = if request.include_explanation {
            Some(self.explainer.explain(&request.query, &results, Some(&sql)).await)
        } else {
            None
        };

        Ok(AgenticQueryResponse {
            success: true,
            query: request.query.clone(),
            sql_query: Some(sql),
            result_count: results.len(),
            results,
            explanation,
            execution_time_ms: outcome.elapsed_ms,
            error: None,
            chart_config,
        })
    }

    /// Best-effort history writes; failures are logged and dropped.
    async fn record_turn(&self, session_id: &str, request: &AgenticQueryRequest, response: &AgenticQueryResponse) {
        let Some(store) = &self.history else {
            return;
        };

        match store.get_session(session_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                let session = NewSession {
                    session_id: session_id.to_string(),
                    user_id: request.user_id,
                    title: request.query.chars().take(SESSION_TITLE_CHARS).collect(),
                };
                if let Err(e) = store.create_session(&session).await {
                    warn!("Could not create session {}: {}", session_id, e);
                }
            }
            Err(e) => warn!("Could not look up session {}: {}", session_id, e),
        }

        let user_message = NewMessage::new(session_id, MessageType::User, request.query.clone()).with_query(&request.query);
        if let Err(e) = store.add_message(user_message).await {
            warn!("Failed to store user message: {}", e);
        }

        if response.success {
            let content = response
                .explanation
                .clone()
                .unwrap_or_else(|| format!("Found {} results", response.result_count));
            let chart = response
                .chart_config
                .as_ref()
                .and_then(|c| serde_json::to_value(c).ok());
            let assistant_message = NewMessage::new(session_id, MessageType::Assistant, content)
                .with_query(&request.query)
                .with_sql(response.sql_query.clone())
                .with_results(response.result_count, response.execution_time_ms)
                .with_chart(chart);
            if let Err(e) = store.add_message(assistant_message).await {
                warn!("Failed to store assistant message: {}", e);
            }
        } else {
            let error_text = response.error.clone().unwrap_or_else(|| "Unknown error".to_string());
            let error_message = NewMessage::new(session_id, MessageType::Error, error_text.clone())
                .with_query(&request.query)
                .with_sql(response.sql_query.clone());
            if let Err(e) = store.add_message(error_message).await {
                warn!("Failed to store error message: {}", e);
            }
            if let Err(e) = store.store_error(session_id, &error_text).await {
                error!("Failed to record conversation error: {}", e);
            }
        }
    }
}

/// Generation failures get a fixed message; the rest carry their own text.
fn failure_message(error: &AgenticError) -> String {
    match error {
        AgenticError::InputRejected(reason) => reason.clone(),
        AgenticError::Generation(_) => "Failed to generate SQL query. Please try rephrasing your question.".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_messages() {
        assert_eq!(
            failure_message(&AgenticError::InputRejected("Query is too short.".into())),
            "Query is too short."
        );
        assert_eq!(
            failure_message(&AgenticError::ValidationRejected("Query contains dangerous operation: DROP TABLE".into())),
            "Query validation failed: Query contains dangerous operation: DROP TABLE"
        );
        assert!(failure_message(&AgenticError::Generation("timeout".into())).starts_with("Failed to generate SQL"));
    }
}
