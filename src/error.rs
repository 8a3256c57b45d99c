use crate::validation::Rejection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NlqError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("LLM returned empty SQL")]
    GenerationEmpty,

    #[error("LLM error: {0}")]
    GenerationTransport(String),

    #[error("ClickHouse syntax invalid")]
    EngineSyntaxRejected,

    #[error("Failed to generate valid SQL after {attempts} attempts. Last error: {last_reason}")]
    RetriesExhausted { attempts: u32, last_reason: String },

    #[error("ClickHouse exec error: {0}")]
    Execution(String),

    #[error("Schema fetch failed: {0}")]
    CatalogFetch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NlqError>;
