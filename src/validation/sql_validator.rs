//! SQL Validator
//!
//! The trust boundary between the generator and the database. A statement is
//! accepted only if it parses as a single read query, references nothing but
//! candidate tables, and survives the deny-list scan after its row limit has
//! been corrected. What comes out is always the re-serialized AST, never the
//! generator's text.

use super::table_refs::{has_final_alias, referenced_tables};
use super::{Rejection, ValidationOutcome};
use crate::schema_rag::CandidateSet;
use sqlparser::ast::{Expr, Query, SetExpr, Statement, Value};
use sqlparser::dialect::ClickHouseDialect;
use sqlparser::parser::Parser;

/// Lower-cased fragments that must not appear in the canonical statement.
const DENIED_FRAGMENTS: &[&str] = &[
    "insert ",
    "update ",
    "delete ",
    "create ",
    "drop ",
    "into outfile",
    "system.",
    "file(",
];

#[derive(Debug, Clone, Copy)]
pub struct SqlValidator {
    max_rows: u64,
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self { max_rows: 1000 }
    }
}

impl SqlValidator {
    pub fn new(max_rows: u64) -> Self {
        Self { max_rows }
    }

    pub fn validate(&self, raw_sql: &str, candidates: &CandidateSet) -> ValidationOutcome {
        validate(raw_sql, candidates, self.max_rows)
    }
}

pub fn validate(raw_sql: &str, candidates: &CandidateSet, max_rows: u64) -> ValidationOutcome {
    match checked_statement(raw_sql, candidates, max_rows) {
        Ok(sql) => ValidationOutcome::Valid { sql },
        Err(rejection) => ValidationOutcome::Invalid(rejection),
    }
}

fn checked_statement(
    raw_sql: &str,
    candidates: &CandidateSet,
    max_rows: u64,
) -> std::result::Result<String, Rejection> {
    let statement = parse_single_query(raw_sql)?;

    let allowed = candidates.allow_set();
    if let Some(table) = referenced_tables(&statement)
        .into_iter()
        .find(|t| !allowed.contains(t))
    {
        return Err(Rejection::DisallowedTable(table));
    }

    if has_final_alias(&statement) {
        return Err(Rejection::UnsupportedModifier("FINAL".to_string()));
    }

    let statement = enforce_row_limit(statement, max_rows)?;

    let sql = statement.to_string();
    let lowered = sql.to_lowercase();
    if DENIED_FRAGMENTS.iter().any(|f| lowered.contains(f)) {
        return Err(Rejection::DisallowedConstruct);
    }

    Ok(sql)
}

fn parse_single_query(raw_sql: &str) -> std::result::Result<Statement, Rejection> {
    let mut statements = Parser::parse_sql(&ClickHouseDialect {}, raw_sql)
        .map_err(|e| Rejection::Parse(e.to_string()))?;

    match statements.len() {
        0 => Err(Rejection::Parse("no statement found".to_string())),
        1 => {
            let statement = statements.remove(0);
            match &statement {
                Statement::Query(query) if is_read_query(query) => Ok(statement),
                _ => Err(Rejection::NotSelect),
            }
        }
        _ => Err(Rejection::NotSelect),
    }
}

fn is_read_query(query: &Query) -> bool {
    let ctes_are_reads = query
        .with
        .as_ref()
        .map_or(true, |with| with.cte_tables.iter().all(|cte| is_read_query(&cte.query)));

    ctes_are_reads && query.locks.is_empty() && is_read_body(&query.body)
}

fn is_read_body(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => is_read_query(query),
        SetExpr::SetOperation { left, right, .. } => is_read_body(left) && is_read_body(right),
        _ => false,
    }
}

/// Inject the cap when there is no limit, lower any limit above it. A limit
/// that is not an integer literal cannot be compared and is replaced.
///
/// `LIMIT n BY cols` bounds rows per group, not in total, so such a query is
/// wrapped as `SELECT * FROM (<query>) LIMIT max_rows`.
fn enforce_row_limit(statement: Statement, max_rows: u64) -> std::result::Result<Statement, Rejection> {
    let mut query = match statement {
        Statement::Query(query) => query,
        other => return Ok(other),
    };

    if !query.limit_by.is_empty() {
        return parse_single_query(&format!("SELECT * FROM ({}) LIMIT {}", query, max_rows));
    }

    let within_cap = match &query.limit {
        Some(Expr::Value(Value::Number(n, _))) => n.parse::<u64>().map_or(false, |n| n <= max_rows),
        _ => false,
    };
    if !within_cap {
        query.limit = Some(Expr::Value(Value::Number(max_rows.to_string(), false)));
    }

    Ok(Statement::Query(query))
}
