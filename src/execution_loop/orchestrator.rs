//! Execution Loop
//!
//! Bounded generate → validate → (dry run) → execute loop. Recoverable
//! failures feed a repair prompt into the next attempt; execution happens at
//! most once per request.

use crate::agent_prompts::PromptComposer;
use crate::error::{NlqError, Result};
use crate::execution::{QueryRequest, QueryResponse, RowSet, SqlExecutor, SyntaxChecker};
use crate::execution_loop::error_classifier::{ErrorClassifier, FailureClass};
use crate::llm::{extract_sql, SqlGenerator};
use crate::schema_rag::{CandidateSelector, CandidateSet, SchemaCatalog};
use crate::validation::{SqlValidator, ValidationOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Loop limits applied when the caller does not override them.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_attempts: u32,
    pub generation_timeout: Duration,
    pub execution_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            generation_timeout: Duration::from_secs(120),
            execution_timeout: Duration::from_secs(30),
        }
    }
}

/// Where a run currently stands.
#[derive(Debug, Clone)]
pub struct AttemptState {
    /// Zero-based.
    pub attempt_index: u32,
    pub last_reason: Option<String>,
    pub prompt: String,
}

impl AttemptState {
    fn new(prompt: String) -> Self {
        Self {
            attempt_index: 0,
            last_reason: None,
            prompt,
        }
    }
}

/// Successful run.
#[derive(Debug, Clone)]
pub struct Completed {
    pub rows: RowSet,
    /// The validated statement that was executed.
    pub sql: String,
    /// Zero-based index of the attempt that produced `sql`.
    pub attempt_index: u32,
}

/// A failed attempt: the SQL text the generator produced (possibly empty)
/// and why it was not executed.
struct AttemptFailure {
    sql: String,
    error: NlqError,
}

pub struct QueryOrchestrator {
    catalog: Arc<SchemaCatalog>,
    generator: Arc<dyn SqlGenerator>,
    executor: Arc<dyn SqlExecutor>,
    syntax_checker: Option<Arc<dyn SyntaxChecker>>,
    selector: CandidateSelector,
    composer: PromptComposer,
    validator: SqlValidator,
    classifier: ErrorClassifier,
    settings: OrchestratorSettings,
}

impl QueryOrchestrator {
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        generator: Arc<dyn SqlGenerator>,
        executor: Arc<dyn SqlExecutor>,
    ) -> Self {
        Self {
            catalog,
            generator,
            executor,
            syntax_checker: None,
            selector: CandidateSelector::default(),
            composer: PromptComposer::default(),
            validator: SqlValidator::default(),
            classifier: ErrorClassifier::new(),
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_syntax_checker(mut self, checker: Arc<dyn SyntaxChecker>) -> Self {
        self.syntax_checker = Some(checker);
        self
    }

    pub fn with_selector(mut self, selector: CandidateSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Sets the row cap for both the prompt text and the validator.
    pub fn with_max_rows(mut self, max_rows: u64) -> Self {
        self.composer = PromptComposer::new(max_rows);
        self.validator = SqlValidator::new(max_rows);
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run the pipeline for one natural-language query.
    pub async fn run(&self, user_query: &str, max_attempts: u32) -> Result<Completed> {
        if max_attempts == 0 {
            return Err(NlqError::RetriesExhausted {
                attempts: 0,
                last_reason: "no attempts allowed".to_string(),
            });
        }

        let snapshot = self.catalog.snapshot().await?;
        let candidates = self.selector.select(&snapshot, user_query);
        info!(
            "Selected {} candidate tables from {}",
            candidates.len(),
            snapshot.len()
        );

        let mut state = AttemptState::new(self.composer.build(user_query, &candidates));

        loop {
            info!("Attempt {} of {}", state.attempt_index + 1, max_attempts);

            let failure = match self.attempt(&state.prompt, &candidates).await {
                Ok(sql) => {
                    let rows = self.execute(&sql).await?;
                    info!(
                        "Query succeeded on attempt {} with {} rows",
                        state.attempt_index + 1,
                        rows.len()
                    );
                    return Ok(Completed {
                        rows,
                        sql,
                        attempt_index: state.attempt_index,
                    });
                }
                Err(failure) => failure,
            };

            if self.classifier.classify(&failure.error) != FailureClass::Repairable {
                return Err(failure.error);
            }

            state.last_reason = Some(failure.error.to_string());
            let reason = state.last_reason.as_deref().unwrap_or_default();
            warn!("Attempt {} failed: {}", state.attempt_index + 1, reason);

            if state.attempt_index + 1 >= max_attempts {
                return Err(NlqError::RetriesExhausted {
                    attempts: max_attempts,
                    last_reason: reason.to_string(),
                });
            }

            state.prompt = self.composer.build_repair(&failure.sql, reason, &candidates);
            state.attempt_index += 1;
        }
    }

    /// Run with the configured attempt budget and fold the outcome into the
    /// response envelope.
    pub async fn handle(&self, request: &QueryRequest) -> QueryResponse {
        let request_id = Uuid::new_v4();
        info!(
            "[{}] Query from '{}': {}",
            request_id, request.requesting_user, request.query
        );

        match self.run(&request.query, self.settings.max_attempts).await {
            Ok(completed) => {
                info!(
                    "[{}] Executed after {} attempt(s): {}",
                    request_id,
                    completed.attempt_index + 1,
                    completed.sql
                );
                QueryResponse::ok(completed.rows)
            }
            Err(e) => {
                match self.classifier.classify(&e) {
                    FailureClass::Internal => error!("[{}] Internal failure: {:?}", request_id, e),
                    _ => warn!("[{}] Request failed: {}", request_id, e),
                }
                QueryResponse::error(self.classifier.client_message(&e))
            }
        }
    }

    /// One generate → validate → dry-run pass. Returns the validated SQL.
    async fn attempt(
        &self,
        prompt: &str,
        candidates: &CandidateSet,
    ) -> std::result::Result<String, AttemptFailure> {
        let raw = self.generate(prompt).await.map_err(|error| AttemptFailure {
            sql: String::new(),
            error,
        })?;

        let sql = extract_sql(&raw);
        if sql.is_empty() {
            return Err(AttemptFailure {
                sql,
                error: NlqError::GenerationEmpty,
            });
        }

        let validated = match self.validator.validate(&sql, candidates) {
            ValidationOutcome::Valid { sql } => sql,
            ValidationOutcome::Invalid(rejection) => {
                return Err(AttemptFailure {
                    sql,
                    error: rejection.into(),
                })
            }
        };

        if let Some(checker) = &self.syntax_checker {
            if !checker.check_syntax(&validated).await {
                return Err(AttemptFailure {
                    sql: validated,
                    error: NlqError::EngineSyntaxRejected,
                });
            }
        }

        Ok(validated)
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let timeout = self.settings.generation_timeout;
        match tokio::time::timeout(timeout, self.generator.generate(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(NlqError::GenerationTransport(format!(
                "LLM call timed out after {:?}",
                timeout
            ))),
        }
    }

    async fn execute(&self, sql: &str) -> Result<RowSet> {
        let timeout = self.settings.execution_timeout;
        match tokio::time::timeout(timeout, self.executor.execute_read_only(sql)).await {
            Ok(result) => result,
            Err(_) => Err(NlqError::Execution(format!(
                "query timed out after {:?}",
                timeout
            ))),
        }
    }
}
