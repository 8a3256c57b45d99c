//! Natural-language questions answered with guarded, read-only ClickHouse SQL.
//!
//! A request flows through schema retrieval, prompt composition, generation,
//! structural validation, an optional engine dry run and a single execution.

pub mod agent_prompts;
pub mod config;
pub mod error;
pub mod execution;
pub mod execution_loop;
pub mod llm;
pub mod metadata;
pub mod schema_rag;
pub mod validation;

pub use config::Config;
pub use error::{NlqError, Result};
pub use execution::{ClickHouseClient, QueryRequest, QueryResponse, Row, RowSet, Value};
pub use execution_loop::{Completed, QueryOrchestrator};
pub use llm::{OllamaClient, SqlGenerator};
pub use schema_rag::{CandidateSelector, SchemaCatalog};
pub use validation::{SqlValidator, ValidationOutcome};
