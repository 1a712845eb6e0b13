//! Service configuration
//!
//! Settings come from the process environment; `.env` is honoured through
//! `dotenv` by the binaries before `Settings::from_env` runs.

use crate::error::{AgenticError, Result};
use crate::sql_generator::CrossCheckPolicy;
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct Settings {
    pub app_name: String,
    pub app_version: String,
    pub environment: String,

    // Database
    pub database_url: String,
    pub db_pool_size: u32,

    // OpenAI
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_temperature: f32,
    pub openai_max_tokens: u32,

    // Pipeline
    pub max_query_length: usize,
    pub schema_file: PathBuf,
    pub cross_check_policy: CrossCheckPolicy,

    // RAG
    pub rag_enabled: bool,
    pub rag_top_k: usize,
    pub rag_index_path: PathBuf,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub docs_path: Option<PathBuf>,
    pub reference_doc_path: Option<PathBuf>,

    // HTTP
    pub server_host: String,
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub api_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "PMS Agentic AI".to_string(),
            app_version: "1.0.0".to_string(),
            environment: "development".to_string(),
            database_url: "mysql://root@localhost:3306/pms".to_string(),
            db_pool_size: 10,
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            openai_temperature: 0.3,
            openai_max_tokens: 2000,
            max_query_length: 500,
            schema_file: PathBuf::from("pms.sql"),
            cross_check_policy: CrossCheckPolicy::Permissive,
            rag_enabled: false,
            rag_top_k: 5,
            rag_index_path: PathBuf::from("data/rag_index.json"),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
            docs_path: None,
            reference_doc_path: None,
            server_host: "0.0.0.0".to_string(),
            server_port: 8000,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
                "http://localhost:5173".to_string(),
                "http://localhost:8080".to_string(),
            ],
            api_prefix: "/api/v1".to_string(),
        }
    }
}

impl Settings {
    /// Build settings from environment variables, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but reads keys through `lookup`, so tests can feed a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let cross_check_policy = match get("CROSS_CHECK_MODE") {
            Some(mode) => mode.parse()?,
            None => defaults.cross_check_policy,
        };

        let cors_origins = get("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.cors_origins);

        Ok(Self {
            app_name: get("APP_NAME").unwrap_or(defaults.app_name),
            app_version: get("APP_VERSION").unwrap_or(defaults.app_version),
            environment: get("ENVIRONMENT").unwrap_or(defaults.environment),
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            db_pool_size: parse_or(&get, "DB_POOL_SIZE", defaults.db_pool_size)?,
            openai_api_key: get("OPENAI_API_KEY").unwrap_or_default(),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            openai_model: get("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            openai_temperature: parse_or(&get, "OPENAI_TEMPERATURE", defaults.openai_temperature)?,
            openai_max_tokens: parse_or(&get, "OPENAI_MAX_TOKENS", defaults.openai_max_tokens)?,
            max_query_length: parse_or(&get, "MAX_QUERY_LENGTH", defaults.max_query_length)?,
            schema_file: get("SCHEMA_FILE").map(PathBuf::from).unwrap_or(defaults.schema_file),
            cross_check_policy,
            rag_enabled: parse_bool_or(&get, "RAG_ENABLED", defaults.rag_enabled)?,
            rag_top_k: parse_or(&get, "RAG_TOP_K", defaults.rag_top_k)?,
            rag_index_path: get("RAG_INDEX_PATH").map(PathBuf::from).unwrap_or(defaults.rag_index_path),
            embedding_model: get("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            embedding_dimensions: parse_or(&get, "EMBEDDING_DIMENSIONS", defaults.embedding_dimensions)?,
            docs_path: get("DOCS_PATH").map(PathBuf::from),
            reference_doc_path: get("REFERENCE_DOC_PATH").map(PathBuf::from),
            server_host: get("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_or(&get, "SERVER_PORT", defaults.server_port)?,
            cors_origins,
            api_prefix: get("API_PREFIX").unwrap_or(defaults.api_prefix),
        })
    }

    pub fn openai_configured(&self) -> bool {
        !self.openai_api_key.trim().is_empty()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Command-line overrides shared by both binaries.
    pub fn with_overrides(mut self, schema_file: Option<PathBuf>, cross_check: Option<&str>) -> Result<Self> {
        if let Some(path) = schema_file {
            self.schema_file = path;
        }
        if let Some(mode) = cross_check {
            self.cross_check_policy = mode.parse()?;
        }
        Ok(self)
    }
}

/// Install the global `tracing` subscriber. `RUST_LOG` wins over
/// `default_level`. Logs go to stderr so stdout stays machine-readable.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AgenticError::Config(format!("{} has invalid value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_bool_or<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(AgenticError::Config(format!("{} has invalid boolean '{}'", key, other))),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_empty() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.max_query_length, 500);
        assert_eq!(settings.openai_model, "gpt-4o-mini");
        assert_eq!(settings.cross_check_policy, CrossCheckPolicy::Permissive);
        assert!(!settings.openai_configured());
        assert!(!settings.rag_enabled);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let settings = Settings::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("SERVER_PORT", "9000"),
            ("RAG_ENABLED", "true"),
            ("CROSS_CHECK_MODE", "strict"),
            ("CORS_ORIGINS", "http://a.test, http://b.test"),
        ]))
        .unwrap();
        assert!(settings.openai_configured());
        assert_eq!(settings.server_port, 9000);
        assert!(settings.rag_enabled);
        assert_eq!(settings.cross_check_policy, CrossCheckPolicy::Strict);
        assert_eq!(settings.cors_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn test_malformed_number_is_config_error() {
        let err = Settings::from_lookup(lookup(&[("DB_POOL_SIZE", "lots")])).unwrap_err();
        assert!(matches!(err, AgenticError::Config(_)));
    }
}
