use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgenticError {
    #[error("Query rejected: {0}")]
    InputRejected(String),

    #[error("Failed to generate SQL query: {0}")]
    Generation(String),

    #[error("Query validation failed: {0}")]
    ValidationRejected(String),

    #[error("Generated SQL does not match the schema: {0}")]
    SchemaMismatch(String),

    #[error("Database query failed: {0}")]
    Execution(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Conversation history error: {0}")]
    History(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<sqlx::Error> for AgenticError {
    fn from(err: sqlx::Error) -> Self {
        AgenticError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgenticError>;
