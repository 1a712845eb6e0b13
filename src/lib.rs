//! Natural-language analytics over the PMS database: a question is
//! validated, turned into schema-grounded SQL, checked for safety,
//! executed, and returned with a chart recommendation and an explanation.

pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod explainer;
pub mod history;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod prompt_validator;
pub mod prompts;
pub mod reference;
pub mod result_set;
pub mod schema_rag;
pub mod schema_registry;
pub mod server;
pub mod sql_generator;
pub mod sql_safety;
pub mod visualization;
pub mod worked_examples;

pub use error::{AgenticError, Result};
pub use orchestrator::AgenticService;
