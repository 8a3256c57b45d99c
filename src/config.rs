//! Runtime configuration read from the environment (and `.env`).

use crate::error::{NlqError, Result};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ClickHouseConfig {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub query_timeout: Duration,
    pub max_result_rows: u64,
    pub max_execution_time: Duration,
    /// Run `EXPLAIN SYNTAX` before executing.
    pub syntax_check: bool,
}

#[derive(Debug, Clone)]
pub struct SchemaConfig {
    pub cache_ttl: Duration,
    pub candidate_tables: usize,
    pub candidate_columns: usize,
    pub excluded_databases: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub clickhouse: ClickHouseConfig,
    pub schema: SchemaConfig,
    pub max_rows: u64,
    pub max_attempts: u32,
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset and blank keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            llm: LlmConfig {
                base_url: get("OLLAMA_URL").unwrap_or_else(|| "http://localhost:11434".to_string()),
                model: get("OLLAMA_MODEL").unwrap_or_else(|| "sqlcoder:7b".to_string()),
                timeout: Duration::from_secs(parse_or(&get, "LLM_TIMEOUT_SECS", 120)?),
            },
            clickhouse: ClickHouseConfig {
                url: get("CLICKHOUSE_URL").unwrap_or_else(|| "http://localhost:8123".to_string()),
                user: get("CLICKHOUSE_USER"),
                password: get("CLICKHOUSE_PASSWORD"),
                database: get("CLICKHOUSE_DATABASE"),
                query_timeout: Duration::from_secs(parse_or(&get, "CLICKHOUSE_QUERY_TIMEOUT_SECS", 30)?),
                max_result_rows: parse_or(&get, "CLICKHOUSE_MAX_RESULT_ROWS", 100_000)?,
                max_execution_time: Duration::from_secs(parse_or(
                    &get,
                    "CLICKHOUSE_MAX_EXECUTION_TIME_SECS",
                    30,
                )?),
                syntax_check: parse_bool_or(&get, "ENGINE_SYNTAX_CHECK", true)?,
            },
            schema: SchemaConfig {
                cache_ttl: Duration::from_secs(60 * parse_or::<u64, _>(&get, "SCHEMA_CACHE_TTL_MINUTES", 5)?),
                candidate_tables: parse_or(&get, "SCHEMA_CANDIDATE_TABLES", 6)?,
                candidate_columns: parse_or(&get, "SCHEMA_CANDIDATE_COLUMNS", 12)?,
                excluded_databases: get("SCHEMA_EXCLUDED_DATABASES")
                    .map(|v| {
                        v.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_else(|| {
                        vec![
                            "system".to_string(),
                            "INFORMATION_SCHEMA".to_string(),
                            "information_schema".to_string(),
                        ]
                    }),
            },
            max_rows: parse_or(&get, "SQL_MAX_ROWS", 1000)?,
            max_attempts: parse_or(&get, "ORCHESTRATOR_MAX_ATTEMPTS", 3)?,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| NlqError::Config(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_bool_or<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(NlqError::Config(format!("{}={:?}: expected a boolean", key, v))),
        },
    }
}
