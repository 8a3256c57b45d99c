use anyhow::Result;
use clap::Parser;
use nlq_guard::execution::clickhouse::ResourceGuards;
use nlq_guard::execution_loop::OrchestratorSettings;
use nlq_guard::{
    CandidateSelector, ClickHouseClient, Config, OllamaClient, QueryOrchestrator, QueryRequest,
    SchemaCatalog,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nlq-guard")]
#[command(about = "Answer a natural-language question with validated, read-only ClickHouse SQL")]
struct Args {
    /// The question in natural language
    query: String,

    /// Requesting user, recorded in logs
    #[arg(short, long, default_value = "cli")]
    user: String,

    /// Generation attempts before giving up (overrides ORCHESTRATOR_MAX_ATTEMPTS)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Skip the EXPLAIN SYNTAX dry run
    #[arg(long)]
    no_syntax_check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!("Using model {} at {}", config.llm.model, config.llm.base_url);

    let clickhouse = Arc::new(
        ClickHouseClient::new(
            config.clickhouse.url.clone(),
            ResourceGuards {
                max_result_rows: config.clickhouse.max_result_rows,
                max_execution_time: config.clickhouse.max_execution_time,
                query_timeout: config.clickhouse.query_timeout,
            },
        )
        .with_credentials(config.clickhouse.user.clone(), config.clickhouse.password.clone())
        .with_database(config.clickhouse.database.clone())
        .with_excluded_databases(config.schema.excluded_databases.clone()),
    );
    let generator = Arc::new(OllamaClient::new(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.timeout,
    ));
    let catalog = Arc::new(SchemaCatalog::new(clickhouse.clone(), config.schema.cache_ttl));

    let mut orchestrator = QueryOrchestrator::new(catalog, generator, clickhouse.clone())
        .with_selector(CandidateSelector::new(
            config.schema.candidate_tables,
            config.schema.candidate_columns,
        ))
        .with_max_rows(config.max_rows)
        .with_settings(OrchestratorSettings {
            max_attempts: args.max_attempts.unwrap_or(config.max_attempts),
            generation_timeout: config.llm.timeout,
            execution_timeout: config.clickhouse.query_timeout,
        });
    if config.clickhouse.syntax_check && !args.no_syntax_check {
        orchestrator = orchestrator.with_syntax_checker(clickhouse);
    }

    let response = orchestrator
        .handle(&QueryRequest::new(args.query, args.user))
        .await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}
