pub mod ai;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod guard;
pub mod pipeline;
pub mod shell;
pub mod storage;

pub use error::{AssistantError, Result, VendorError};

use ai::{AIService, QueryGenerator};
use clap::Parser;
use commands::AppState;
use config::AppConfig;
use db::{DatabaseGateway, PostgresConnector};
use guard::SqlGuard;
use pipeline::Pipeline;
use shell::{Args, Shell, ShellCommand};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable read for the database password before prompting.
pub const PASSWORD_VAR: &str = "SQLPILOT_DB_PASSWORD";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sqlpilot_lib=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub async fn run() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = AppConfig::from_lookup(|key| {
        args.env_override(key).or_else(|| std::env::var(key).ok())
    })?;

    let ai_service = Arc::new(AIService::new());
    match config.ai_config() {
        Some(ai_config) => {
            info!("Using {:?} model {}", ai_config.provider, ai_config.model);
            ai_service.configure(ai_config).await;
        }
        None => warn!(
            "No API key found for {:?}; set {} or SQLPILOT_AI_API_KEY to enable SQL generation",
            config.provider,
            config.provider.key_var()
        ),
    }

    let gateway = Arc::new(
        DatabaseGateway::new(config.dsn.clone(), Arc::new(PostgresConnector))
            .with_ssl_mode(config.ssl_mode)
            .with_slow_query_threshold(config.slow_query_threshold_ms),
    );
    let generator = QueryGenerator::new(ai_service).with_temperature(config.temperature);
    let mut pipeline = Pipeline::new(generator, SqlGuard::new(), gateway);

    // Local history is optional; the assistant works without it.
    if let Some(path) = &config.history_db {
        match storage::LocalDb::open(path) {
            Ok(local_db) => pipeline = pipeline.with_history(local_db),
            Err(e) => error!("Failed to initialize local database: {}", e),
        }
    }

    let state = AppState::new(pipeline);
    let mut shell = Shell::new(&state, args.schema.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();

    if let Some(user) = &args.user {
        let password = match std::env::var(PASSWORD_VAR) {
            Ok(password) => password,
            Err(_) => {
                write!(stdout, "Password for {}: ", user)?;
                stdout.flush()?;
                lines.next_line().await?.unwrap_or_default()
            }
        };
        shell
            .handle(
                ShellCommand::Connect {
                    user: user.clone(),
                    password,
                },
                &mut stdout,
            )
            .await?;
    }

    shell.run(&mut lines, &mut stdout).await?;
    commands::disconnect(&state).await;
    Ok(())
}
