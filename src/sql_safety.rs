//! SQL Safety Validator
//!
//! Two layers: a word-boundary denylist of mutating statement shapes, then
//! an LLM review that must answer SAFE/UNSAFE. Any doubt rejects.

use crate::llm::{CompletionProvider, CompletionRequest, SafetyVerdict};
use crate::prompts::build_validation_prompt;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

lazy_static! {
    static ref DENYLIST: Vec<(&'static str, Regex)> = [
        ("DELETE FROM", r"(?i)\bDELETE\s+FROM\b"),
        ("DROP TABLE", r"(?i)\bDROP\s+TABLE\b"),
        ("DROP DATABASE", r"(?i)\bDROP\s+DATABASE\b"),
        ("TRUNCATE TABLE", r"(?i)\bTRUNCATE\s+TABLE\b"),
        ("UPDATE ... SET", r"(?is)\bUPDATE\s+\S+.*?\bSET\b"),
        ("ALTER TABLE", r"(?i)\bALTER\s+TABLE\b"),
        ("INSERT INTO", r"(?i)\bINSERT\s+INTO\b"),
        ("CREATE TABLE", r"(?i)\bCREATE\s+TABLE\b"),
        ("CREATE DATABASE", r"(?i)\bCREATE\s+DATABASE\b"),
        ("CREATE INDEX", r"(?i)\bCREATE\s+(?:UNIQUE\s+)?INDEX\b"),
    ]
    .iter()
    .map(|(name, pattern)| (*name, Regex::new(pattern).unwrap()))
    .collect();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub is_safe: bool,
    pub reason: String,
}

impl SafetyReport {
    fn unsafe_because(reason: impl Into<String>) -> Self {
        Self {
            is_safe: false,
            reason: reason.into(),
        }
    }
}

/// Stage 1 on its own. Returns the name of the first denylisted shape found.
pub fn denylisted_pattern(sql: &str) -> Option<&'static str> {
    DENYLIST
        .iter()
        .find(|(_, re)| re.is_match(sql))
        .map(|(name, _)| *name)
}

pub struct SqlSafetyValidator {
    llm: Arc<dyn CompletionProvider>,
}

impl SqlSafetyValidator {
    pub fn new(llm: Arc<dyn CompletionProvider>) -> Self {
        Self { llm }
    }

    pub async fn validate(&self, sql: &str) -> SafetyReport {
        if sql.trim().is_empty() {
            return SafetyReport::unsafe_because("Empty SQL query");
        }

        if let Some(pattern) = denylisted_pattern(sql) {
            warn!("SQL rejected by denylist: {}", pattern);
            return SafetyReport::unsafe_because(format!("Query contains dangerous operation: {}", pattern));
        }

        let request = CompletionRequest::new("", build_validation_prompt(sql))
            .with_temperature(0.1)
            .with_max_tokens(100);

        match self.llm.complete(request).await {
            Ok(response) => {
                let verdict = SafetyVerdict::parse(&response);
                info!(is_safe = verdict.is_safe, "LLM safety check: {}", verdict.reason);
                SafetyReport {
                    is_safe: verdict.is_safe,
                    reason: verdict.reason,
                }
            }
            Err(e) => {
                warn!("LLM safety check failed, rejecting: {}", e);
                SafetyReport::unsafe_because(format!("Validation error: {}", e))
            }
        }
    }
}
