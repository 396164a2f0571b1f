mod api;
mod catalog;
mod codec;
mod config;
mod db;
mod error;
mod extract;
mod fetcher;
mod flatten;
mod pipeline;
mod query;
mod scheduler;
mod storage;
mod types;

use std::sync::Arc;

use sqlx::sqlite::SqliteConnectOptions;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::{Config, CHANNEL_CAPACITY};
use crate::db::RunLedgerWriter;
use crate::error::Result;
use crate::fetcher::NeoFeedClient;
use crate::pipeline::Pipeline;
use crate::query::{AthenaClient, QueryRunner};
use crate::scheduler::Scheduler;
use crate::types::Sequence;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let options = SqliteConnectOptions::new()
        .filename(&cfg.db_path)
        .create_if_missing(true);
    let pool = sqlx::SqlitePool::connect_with(options).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Run ledger ready at {}", cfg.db_path);

    // Missing settings only fail the sequence that needs them, at run time.
    if let Err(e) = cfg.ingest_settings() {
        warn!("Ingest runs will fail until configured: {e}");
    }
    if let Err(e) = cfg.summarize_settings() {
        warn!("Summary runs will fail until configured: {e}");
    }

    // --- Shared state ---
    let latency = Arc::new(LatencyStats::new());
    let health = Arc::new(HealthState::new());
    let shutdown = CancellationToken::new();

    // --- Collaborators ---
    let engine = Arc::new(AthenaClient::new(&cfg)?);
    let runner = QueryRunner::new(engine, Arc::clone(&latency));
    let store = storage::from_config(&cfg)?;
    let feed = Arc::new(NeoFeedClient::new(&cfg.feed_url)?);
    info!(
        backend = ?cfg.storage_backend,
        strategy = %cfg.summary_strategy,
        csv_mode = ?cfg.csv_mode,
        "Pipeline configured"
    );

    // --- Run ledger writer ---
    let (ledger_tx, ledger_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let writer = RunLedgerWriter::new(pool.clone(), ledger_rx);
    tokio::spawn(async move { writer.run().await });

    let pipeline = Arc::new(
        Pipeline::new(cfg.clone(), feed, store, runner, Arc::clone(&health)).with_ledger(ledger_tx),
    );

    // --- Schedulers ---
    let ingest = Scheduler::new(
        Arc::clone(&pipeline),
        Sequence::Ingest,
        cfg.ingest_interval_secs,
        shutdown.clone(),
    );
    tokio::spawn(async move { ingest.run().await });

    let summary = Scheduler::new(
        Arc::clone(&pipeline),
        Sequence::Summarize,
        cfg.summary_interval_secs,
        shutdown.clone(),
    );
    tokio::spawn(async move { summary.run().await });

    // --- HTTP API server ---
    let api_state = ApiState {
        pool: pool.clone(),
        pipeline,
        health,
        latency,
        shutdown: shutdown.clone(),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C and cancels every in-flight run.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received, shutting down");
    shutdown.cancel();
}
