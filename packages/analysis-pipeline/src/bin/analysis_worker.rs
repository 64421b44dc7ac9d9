// Main entry point for the analysis worker

use std::sync::Arc;

use analysis_pipeline::{
    AnalysisBackend, AnalysisWorker, FailoverRouter, GeminiBackend, Notifier, NullNotifier,
    OpenAiBackend, PipelineConfig, PostgresVacancyStore, RetryBackend, RetryPolicy,
    TelegramNotifier, VacancyAnalyzer, WorkerConfig,
};
use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "analysis-worker", about = "Vacancy analysis worker")]
struct Args {
    /// Worker instance ID; defaults to a random one
    #[arg(long)]
    worker_id: Option<String>,

    /// Override the claim batch size from the environment
    #[arg(long)]
    batch_size: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,analysis_pipeline=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    tracing::info!("Starting vacancy analysis worker");

    // Load configuration
    let config = PipelineConfig::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Build the failover chain in priority order: Gemini first (cheaper),
    // OpenAI as fallback. Each backend retries its own rate limits before
    // the router moves on.
    let retry = RetryPolicy::new(config.retry_max_attempts, config.retry_base_delay);
    let mut backends: Vec<Arc<dyn AnalysisBackend>> = Vec::new();
    if let Some(key) = &config.gemini_api_key {
        backends.push(Arc::new(RetryBackend::new(
            GeminiBackend::with_cooldown(
                key.clone(),
                config.gemini_model.clone(),
                config.backend_cooldown,
            ),
            retry,
        )));
        tracing::info!(model = %config.gemini_model, "Gemini backend enabled");
    }
    if let Some(key) = &config.openai_api_key {
        backends.push(Arc::new(RetryBackend::new(
            OpenAiBackend::with_cooldown(
                key.clone(),
                config.openai_model.clone(),
                config.backend_cooldown,
            ),
            retry,
        )));
        tracing::info!(model = %config.openai_model, "OpenAI backend enabled");
    }
    let router = Arc::new(FailoverRouter::new(backends));
    let analyzer = Arc::new(VacancyAnalyzer::new(router));

    let store = Arc::new(PostgresVacancyStore::with_lease_ms(pool, config.lease_ms));

    let notifier: Arc<dyn Notifier> =
        match (&config.telegram_bot_token, &config.telegram_chat_id) {
            (Some(token), Some(chat_id)) => {
                tracing::info!("Telegram notifications enabled");
                Arc::new(TelegramNotifier::new(
                    token.clone(),
                    chat_id.clone(),
                    config.notify_min_score,
                ))
            }
            _ => {
                tracing::warn!("Telegram credentials missing, notifications disabled");
                Arc::new(NullNotifier)
            }
        };

    let mut worker_config = WorkerConfig {
        batch_size: config.worker_batch_size,
        poll_interval: config.worker_poll_interval,
        pace_delay: config.worker_pace_delay,
        concurrency: config.worker_concurrency,
        ..Default::default()
    };
    if let Some(worker_id) = args.worker_id {
        worker_config.worker_id = worker_id;
    }
    if let Some(batch_size) = args.batch_size {
        worker_config.batch_size = batch_size;
    }

    let worker = AnalysisWorker::new(store, analyzer, notifier, worker_config);

    // Graceful shutdown on ctrl-c
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    worker.run(shutdown).await
}
