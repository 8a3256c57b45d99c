//! Execution collaborators: running validated SQL and engine-level dry runs.

pub mod clickhouse;
pub mod result;

pub use clickhouse::ClickHouseClient;
pub use result::{QueryRequest, QueryResponse, Row, RowSet, Value};

use crate::error::Result;
use async_trait::async_trait;

/// Runs a statement that has already passed validation.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute_read_only(&self, sql: &str) -> Result<RowSet>;
}

/// Asks the engine whether it accepts a statement without running it.
/// Implementations log their own failures and answer `false`.
#[async_trait]
pub trait SyntaxChecker: Send + Sync {
    async fn check_syntax(&self, sql: &str) -> bool;
}
