//! Request and response types for the query pipeline and HTTP surface

use crate::result_set::ResultSet;
use crate::visualization::ChartConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgenticQueryRequest {
    pub query: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default = "default_true")]
    pub include_explanation: bool,
    /// Accepted for client compatibility; no speech output is produced.
    #[serde(default)]
    pub speak_response: bool,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl AgenticQueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user_id: None,
            include_explanation: true,
            speak_response: false,
            role: None,
            session_id: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn without_explanation(mut self) -> Self {
        self.include_explanation = false;
        self
    }

    /// Trims the query in place and checks its length. The error text is
    /// what the HTTP layer returns with a 422.
    pub fn normalise(&mut self, max_length: usize) -> Result<(), String> {
        let trimmed = self.query.trim();
        if trimmed.is_empty() {
            return Err("Query cannot be empty".to_string());
        }
        let length = trimmed.chars().count();
        if length > max_length {
            return Err(format!(
                "Query must be at most {} characters (got {})",
                max_length, length
            ));
        }
        self.query = trimmed.to_string();
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgenticQueryResponse {
    pub success: bool,
    pub query: String,
    pub sql_query: Option<String>,
    pub results: ResultSet,
    pub explanation: Option<String>,
    pub result_count: usize,
    pub execution_time_ms: f64,
    pub error: Option<String>,
    pub chart_config: Option<ChartConfig>,
}

impl AgenticQueryResponse {
    /// Failed response: empty results, zero time, no chart.
    pub fn failure(query: &str, sql_query: Option<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            query: query.to_string(),
            sql_query,
            results: ResultSet::default(),
            explanation: None,
            result_count: 0,
            execution_time_ms: 0.0,
            error: Some(error.into()),
            chart_config: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateQueryRequest {
    pub sql_query: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateQueryResponse {
    pub is_safe: bool,
    pub reason: String,
    pub query: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub database_connected: bool,
    pub openai_configured: bool,
    pub timestamp: DateTime<Utc>,
}

impl HealthStatus {
    pub fn new(version: &str, database_connected: bool, openai_configured: bool) -> Self {
        let status = if database_connected && openai_configured {
            "healthy"
        } else {
            "degraded"
        };
        Self {
            status: status.to_string(),
            version: version.to_string(),
            database_connected,
            openai_configured,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request: AgenticQueryRequest = serde_json::from_str(r#"{"query": "pending tickets"}"#).unwrap();
        assert!(request.include_explanation);
        assert!(!request.speak_response);
        assert!(request.role.is_none());
    }

    #[test]
    fn test_normalise_trims_and_bounds() {
        let mut request = AgenticQueryRequest::new("   show open tickets  ");
        request.normalise(500).unwrap();
        assert_eq!(request.query, "show open tickets");

        assert!(AgenticQueryRequest::new("   ").normalise(500).is_err());
        assert!(AgenticQueryRequest::new("x".repeat(501)).normalise(500).is_err());
        assert!(AgenticQueryRequest::new("x".repeat(500)).normalise(500).is_ok());
    }

    #[test]
    fn test_failure_shape() {
        let response = AgenticQueryResponse::failure("drop it", Some("DROP TABLE users".into()), "unsafe");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["results"], serde_json::json!([]));
        assert_eq!(json["execution_time_ms"], 0.0);
        assert_eq!(json["sql_query"], "DROP TABLE users");
        assert!(json["chart_config"].is_null());
    }

    #[test]
    fn test_health_status() {
        assert_eq!(HealthStatus::new("1.0.0", true, true).status, "healthy");
        assert_eq!(HealthStatus::new("1.0.0", false, true).status, "degraded");
    }
}
