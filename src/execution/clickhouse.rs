//! ClickHouse over its HTTP interface.
//!
//! One client serves three roles: executing validated statements, the
//! `EXPLAIN SYNTAX` dry run, and schema introspection for the catalog.

use super::result::{Row, RowSet, Value};
use super::{SqlExecutor, SyntaxChecker};
use crate::error::{NlqError, Result};
use crate::metadata::ColumnTriple;
use crate::schema_rag::SchemaSource;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Session-level guards sent with every executed statement.
#[derive(Debug, Clone)]
pub struct ResourceGuards {
    pub max_result_rows: u64,
    pub max_execution_time: Duration,
    /// Client-side bound on the whole HTTP round trip.
    pub query_timeout: Duration,
}

impl Default for ResourceGuards {
    fn default() -> Self {
        Self {
            max_result_rows: 100_000,
            max_execution_time: Duration::from_secs(30),
            query_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ColumnMeta {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
}

/// Body of a `FORMAT JSONCompact` response.
#[derive(Debug, Deserialize)]
struct CompactResult {
    meta: Vec<ColumnMeta>,
    data: Vec<Vec<serde_json::Value>>,
}

pub struct ClickHouseClient {
    client: reqwest::Client,
    base_url: String,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
    guards: ResourceGuards,
    excluded_databases: Vec<String>,
}

impl ClickHouseClient {
    pub fn new(base_url: impl Into<String>, guards: ResourceGuards) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            user: None,
            password: None,
            database: None,
            guards,
            excluded_databases: vec![
                "system".to_string(),
                "INFORMATION_SCHEMA".to_string(),
                "information_schema".to_string(),
            ],
        }
    }

    pub fn with_credentials(mut self, user: Option<String>, password: Option<String>) -> Self {
        self.user = user;
        self.password = password;
        self
    }

    pub fn with_database(mut self, database: Option<String>) -> Self {
        self.database = database;
        self
    }

    /// Databases left out of schema introspection.
    pub fn with_excluded_databases(mut self, databases: Vec<String>) -> Self {
        self.excluded_databases = databases;
        self
    }

    fn request(&self, body: String, settings: &[(&str, String)]) -> reqwest::RequestBuilder {
        let mut params: Vec<(&str, String)> = settings.to_vec();
        if let Some(database) = &self.database {
            params.push(("database", database.clone()));
        }

        let mut request = self
            .client
            .post(&self.base_url)
            .query(&params)
            .timeout(self.guards.query_timeout)
            .body(body);
        if let Some(user) = &self.user {
            request = request.header("X-ClickHouse-User", user);
        }
        if let Some(password) = &self.password {
            request = request.header("X-ClickHouse-Key", password);
        }
        request
    }

    fn session_settings(&self) -> Vec<(&'static str, String)> {
        vec![
            // 2: reads only, but settings may still be changed per request
            ("readonly", "2".to_string()),
            ("max_result_rows", self.guards.max_result_rows.to_string()),
            ("result_overflow_mode", "throw".to_string()),
            (
                "max_execution_time",
                self.guards.max_execution_time.as_secs().max(1).to_string(),
            ),
        ]
    }

    /// Send `sql` and decode a JSONCompact body. Errors are returned as text.
    async fn query_compact(
        &self,
        sql: &str,
        settings: &[(&str, String)],
    ) -> std::result::Result<CompactResult, String> {
        let body = format!("{} FORMAT JSONCompact", sql.trim().trim_end_matches(';'));
        let response = self
            .request(body, settings)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status, text.trim()));
        }

        response
            .json::<CompactResult>()
            .await
            .map_err(|e| format!("malformed response: {}", e))
    }

    fn excluded_list(&self) -> String {
        self.excluded_databases
            .iter()
            .map(|db| format!("'{}'", db.replace('\\', "\\\\").replace('\'', "\\'")))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[async_trait]
impl SqlExecutor for ClickHouseClient {
    async fn execute_read_only(&self, sql: &str) -> Result<RowSet> {
        debug!("Executing: {}", sql);
        let result = self
            .query_compact(sql, &self.session_settings())
            .await
            .map_err(NlqError::Execution)?;
        Ok(decode_rows(&result))
    }
}

#[async_trait]
impl SyntaxChecker for ClickHouseClient {
    async fn check_syntax(&self, sql: &str) -> bool {
        let body = format!("EXPLAIN SYNTAX {}", sql.trim().trim_end_matches(';'));
        let response = match self.request(body, &[]).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("ClickHouse syntax validation failed: {}", e);
                return false;
            }
        };

        if response.status().is_success() {
            return true;
        }
        let text = response.text().await.unwrap_or_default();
        warn!("ClickHouse syntax validation failed: {}", text.trim());
        false
    }
}

#[async_trait]
impl SchemaSource for ClickHouseClient {
    async fn fetch_columns(&self) -> Result<Vec<ColumnTriple>> {
        let mut sql = "SELECT database, table, name FROM system.columns".to_string();
        if !self.excluded_databases.is_empty() {
            sql.push_str(&format!(" WHERE database NOT IN ({})", self.excluded_list()));
        }
        sql.push_str(" ORDER BY database, table, position");

        let result = self
            .query_compact(&sql, &[])
            .await
            .map_err(NlqError::CatalogFetch)?;

        result
            .data
            .iter()
            .map(|row| match row.as_slice() {
                [serde_json::Value::String(database), serde_json::Value::String(table), serde_json::Value::String(column)] => {
                    Ok(ColumnTriple::new(database.as_str(), table.as_str(), column.as_str()))
                }
                other => Err(NlqError::CatalogFetch(format!(
                    "unexpected system.columns row: {:?}",
                    other
                ))),
            })
            .collect()
    }
}

fn decode_rows(result: &CompactResult) -> RowSet {
    result
        .data
        .iter()
        .map(|values| {
            result
                .meta
                .iter()
                .zip(values)
                .map(|(meta, raw)| (meta.name.clone(), decode_value(&meta.type_name, raw)))
                .collect::<Row>()
        })
        .collect()
}

/// `Nullable(T)` and `LowCardinality(T)` decode as `T`.
fn base_type(type_name: &str) -> &str {
    let mut current = type_name.trim();
    loop {
        let inner = ["Nullable(", "LowCardinality("]
            .iter()
            .find_map(|prefix| current.strip_prefix(prefix))
            .and_then(|rest| rest.strip_suffix(')'));
        match inner {
            Some(inner) => current = inner.trim(),
            None => return current,
        }
    }
}

/// Map one JSONCompact cell to a [`Value`] using its column type.
///
/// Lossy cases: integers outside `i64` (large `UInt64`, `Int128`, `UInt256`)
/// and anything that fails to parse as its declared type keep their text as
/// `Value::String`.
fn decode_value(type_name: &str, raw: &serde_json::Value) -> Value {
    use serde_json::Value as Json;

    if raw.is_null() {
        return Value::Null;
    }

    let base = base_type(type_name);
    let text = raw.as_str();

    if base.starts_with("Int") || base.starts_with("UInt") {
        // 64-bit integers arrive quoted by default
        let parsed = match raw {
            Json::Number(n) => n.as_i64(),
            Json::String(s) => s.parse::<i64>().ok(),
            _ => None,
        };
        if let Some(i) = parsed {
            return Value::Integer(i);
        }
    } else if base.starts_with("Float") || base.starts_with("Decimal") {
        let parsed = match raw {
            Json::Number(n) => n.as_f64(),
            Json::String(s) => s.parse::<f64>().ok(),
            _ => None,
        };
        if let Some(f) = parsed {
            return Value::Float(f);
        }
    } else if base == "Bool" {
        if let Some(b) = raw.as_bool() {
            return Value::Boolean(b);
        }
    } else if base.starts_with("DateTime") {
        if let Some(dt) = text.and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok()) {
            return Value::DateTime(dt);
        }
    } else if base.starts_with("Date") {
        if let Some(d) = text.and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()) {
            return Value::Date(d);
        }
    }

    match raw {
        Json::String(s) => Value::String(s.clone()),
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or_else(|| Value::String(n.to_string())),
        other => Value::String(other.to_string()),
    }
}
