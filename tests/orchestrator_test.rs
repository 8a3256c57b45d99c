use async_trait::async_trait;
use nlq_guard::execution::{SqlExecutor, SyntaxChecker};
use nlq_guard::execution_loop::{OrchestratorSettings, QueryOrchestrator};
use nlq_guard::metadata::ColumnTriple;
use nlq_guard::schema_rag::{SchemaCatalog, SchemaSource};
use nlq_guard::{NlqError, QueryRequest, Result, Row, RowSet, SqlGenerator, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

enum Reply {
    Text(&'static str),
    Fail(NlqError),
    Hang,
}

/// Replays canned generator output and records every prompt it was given.
struct ScriptedGenerator {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(text.to_string()),
            Some(Reply::Fail(e)) => Err(e),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
            None => Ok(String::new()),
        }
    }
}

struct CountingExecutor {
    calls: AtomicUsize,
    executed: Mutex<Vec<String>>,
    failure: Option<&'static str>,
}

impl CountingExecutor {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
            failure: None,
        })
    }

    fn failing(message: &'static str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
            failure: Some(message),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SqlExecutor for CountingExecutor {
    async fn execute_read_only(&self, sql: &str) -> Result<RowSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.executed.lock().unwrap().push(sql.to_string());
        if let Some(message) = self.failure {
            return Err(NlqError::Execution(message.to_string()));
        }
        let mut row = Row::new();
        row.push("id", Value::Integer(1));
        Ok(vec![row])
    }
}

struct StaticSource {
    fail: bool,
}

#[async_trait]
impl SchemaSource for StaticSource {
    async fn fetch_columns(&self) -> Result<Vec<ColumnTriple>> {
        if self.fail {
            return Err(NlqError::CatalogFetch("connection refused".to_string()));
        }
        Ok(vec![
            ColumnTriple::new("shop", "orders", "id"),
            ColumnTriple::new("shop", "orders", "customer_id"),
            ColumnTriple::new("shop", "orders", "amount"),
            ColumnTriple::new("shop", "customers", "id"),
            ColumnTriple::new("shop", "customers", "name"),
            ColumnTriple::new("shop", "customers", "country"),
        ])
    }
}

/// Answers the dry run from a script; `true` once the script runs out.
struct ScriptedChecker {
    answers: Mutex<VecDeque<bool>>,
}

#[async_trait]
impl SyntaxChecker for ScriptedChecker {
    async fn check_syntax(&self, _sql: &str) -> bool {
        self.answers.lock().unwrap().pop_front().unwrap_or(true)
    }
}

fn orchestrator(
    generator: Arc<ScriptedGenerator>,
    executor: Arc<CountingExecutor>,
) -> QueryOrchestrator {
    let catalog = Arc::new(SchemaCatalog::new(
        Arc::new(StaticSource { fail: false }),
        Duration::from_secs(300),
    ));
    QueryOrchestrator::new(catalog, generator, executor).with_settings(OrchestratorSettings {
        max_attempts: 3,
        generation_timeout: Duration::from_millis(200),
        execution_timeout: Duration::from_secs(5),
    })
}

#[tokio::test]
async fn test_blank_generations_exhaust_retries_without_executing() {
    let generator = ScriptedGenerator::new(vec![
        Reply::Text(""),
        Reply::Text("   "),
        Reply::Text("``````"),
    ]);
    let executor = CountingExecutor::ok();
    let orchestrator = orchestrator(generator.clone(), executor.clone());

    let response = orchestrator
        .handle(&QueryRequest::new("list orders", "alice"))
        .await;

    assert!(!response.success);
    assert!(response.rows.is_none());
    let message = response.message.unwrap();
    assert!(message.contains("after 3 attempts"), "{}", message);
    assert!(message.ends_with("Last error: LLM returned empty SQL"), "{}", message);
    assert_eq!(generator.prompts().len(), 3);
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn test_repair_converges_on_second_attempt() {
    let generator = ScriptedGenerator::new(vec![
        Reply::Text("```sql\nSELECT * FROM users\n```"),
        Reply::Text("```sql\nSELECT id, amount FROM orders ORDER BY amount DESC\n```"),
    ]);
    let executor = CountingExecutor::ok();
    let orchestrator = orchestrator(generator.clone(), executor.clone());

    let completed = orchestrator.run("list orders", 3).await.unwrap();

    assert_eq!(completed.attempt_index, 1);
    assert_eq!(completed.rows.len(), 1);
    assert!(completed.sql.ends_with("LIMIT 1000"), "{}", completed.sql);
    assert_eq!(executor.calls(), 1);
    assert_eq!(executor.executed.lock().unwrap()[0], completed.sql);

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("\"list orders\""));
    assert!(prompts[1].contains("Previous SQL had error: Referenced disallowed table: users"));
    assert!(prompts[1].contains("SELECT * FROM users"));
    assert!(prompts[1].contains("- shop.orders: ["));
}

#[tokio::test]
async fn test_engine_syntax_rejection_consumes_an_attempt() {
    let generator = ScriptedGenerator::new(vec![
        Reply::Text("SELECT id FROM orders"),
        Reply::Text("SELECT id FROM orders"),
    ]);
    let executor = CountingExecutor::ok();
    let checker = Arc::new(ScriptedChecker {
        answers: Mutex::new(vec![false, true].into()),
    });
    let orchestrator =
        orchestrator(generator.clone(), executor.clone()).with_syntax_checker(checker);

    let completed = orchestrator.run("list orders", 3).await.unwrap();

    assert_eq!(completed.attempt_index, 1);
    assert_eq!(executor.calls(), 1);
    assert!(generator.prompts()[1].contains("Previous SQL had error: ClickHouse syntax invalid"));
}

#[tokio::test]
async fn test_execution_failure_is_not_retried() {
    let generator = ScriptedGenerator::new(vec![
        Reply::Text("SELECT id FROM orders"),
        Reply::Text("SELECT id FROM orders"),
    ]);
    let executor = CountingExecutor::failing("Code: 241. Memory limit exceeded");
    let orchestrator = orchestrator(generator.clone(), executor.clone());

    let response = orchestrator
        .handle(&QueryRequest::new("list orders", "alice"))
        .await;

    assert!(!response.success);
    assert_eq!(
        response.message.as_deref(),
        Some("ClickHouse exec error: Code: 241. Memory limit exceeded")
    );
    assert_eq!(generator.prompts().len(), 1);
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn test_generation_timeout_consumes_an_attempt() {
    let generator = ScriptedGenerator::new(vec![
        Reply::Hang,
        Reply::Text("SELECT id FROM orders LIMIT 5"),
    ]);
    let executor = CountingExecutor::ok();
    let orchestrator = orchestrator(generator.clone(), executor.clone());

    let completed = orchestrator.run("list orders", 3).await.unwrap();

    assert_eq!(completed.attempt_index, 1);
    assert!(completed.sql.ends_with("LIMIT 5"));
    assert!(generator.prompts()[1].contains("timed out"));
}

#[tokio::test]
async fn test_transport_failure_is_repaired() {
    let generator = ScriptedGenerator::new(vec![
        Reply::Fail(NlqError::GenerationTransport("connection reset".to_string())),
        Reply::Text("SELECT id FROM orders"),
    ]);
    let executor = CountingExecutor::ok();
    let orchestrator = orchestrator(generator.clone(), executor.clone());

    let completed = orchestrator.run("list orders", 2).await.unwrap();
    assert_eq!(completed.attempt_index, 1);
    assert!(generator.prompts()[1].contains("LLM error: connection reset"));
}

#[tokio::test]
async fn test_zero_attempts_fails_without_generating() {
    let generator = ScriptedGenerator::new(vec![Reply::Text("SELECT id FROM orders")]);
    let executor = CountingExecutor::ok();
    let orchestrator = orchestrator(generator.clone(), executor.clone());

    let err = orchestrator.run("list orders", 0).await.unwrap_err();

    assert!(matches!(err, NlqError::RetriesExhausted { attempts: 0, .. }));
    assert!(generator.prompts().is_empty());
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn test_unmatched_query_falls_back_to_first_tables() {
    let generator = ScriptedGenerator::new(vec![Reply::Text("SELECT name FROM shop.customers")]);
    let executor = CountingExecutor::ok();
    let orchestrator = orchestrator(generator.clone(), executor.clone());

    let response = orchestrator
        .handle(&QueryRequest::new("xyzzy", "alice"))
        .await;

    assert!(response.success);
    assert!(response.message.is_none());
    assert_eq!(response.rows.map(|rows| rows.len()), Some(1));

    let prompt = &generator.prompts()[0];
    assert!(prompt.contains("- shop.customers: [id, name, country]"));
    assert!(prompt.contains("- shop.orders: [id, customer_id, amount]"));
}

#[tokio::test]
async fn test_catalog_failure_surfaces_before_generation() {
    let generator = ScriptedGenerator::new(vec![Reply::Text("SELECT id FROM orders")]);
    let executor = CountingExecutor::ok();
    let catalog = Arc::new(SchemaCatalog::new(
        Arc::new(StaticSource { fail: true }),
        Duration::from_secs(300),
    ));
    let orchestrator = QueryOrchestrator::new(catalog, generator.clone(), executor.clone());

    let response = orchestrator
        .handle(&QueryRequest::new("list orders", "alice"))
        .await;

    assert!(!response.success);
    assert_eq!(
        response.message.as_deref(),
        Some("Schema fetch failed: connection refused")
    );
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn test_internal_fault_is_masked_in_envelope() {
    let generator = ScriptedGenerator::new(vec![Reply::Fail(NlqError::Internal(
        "prompt template missing".to_string(),
    ))]);
    let executor = CountingExecutor::ok();
    let orchestrator = orchestrator(generator, executor.clone());

    let response = orchestrator
        .handle(&QueryRequest::new("list orders", "alice"))
        .await;

    assert!(!response.success);
    assert_eq!(response.message.as_deref(), Some("Internal error"));
    assert!(response.rows.is_none());
    assert_eq!(executor.calls(), 0);
}
