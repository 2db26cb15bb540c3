//! Search indexer
//!
//! Receives sync events pushed by the collectors of managed clusters and
//! keeps the search database up to date.
//!
//! Usage:
//!   search-indexer --db-path search.db --address 0.0.0.0:3010

use anyhow::{Context, Result};
use clap::Parser;
use indexer_db::SqlitePool;
use indexer_sync::{AdmissionConfig, AdmissionController, EngineConfig, SyncEngine};
use search_indexer::{build_router, AppState};
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "search-indexer")]
#[command(about = "Indexes resources pushed by managed cluster collectors")]
struct Args {
    /// Path to the SQLite database file
    #[arg(long, env = "DB_PATH", default_value = "search.db")]
    db_path: PathBuf,

    /// Statements per batch unit sent to the database
    #[arg(long, env = "DB_BATCH_SIZE", default_value_t = 2500)]
    batch_size: usize,

    /// Maximum number of clusters with a request in flight
    #[arg(long, env = "REQUEST_LIMIT", default_value_t = 25)]
    request_limit: usize,

    /// Bodies larger than this many bytes count as large requests
    #[arg(long, env = "LARGE_REQUEST_SIZE", default_value_t = 20 * 1024 * 1024)]
    large_request_size: u64,

    /// Maximum number of large requests in flight
    #[arg(long, env = "LARGE_REQUEST_LIMIT", default_value_t = 5)]
    large_request_limit: usize,

    /// Cluster exempt from the request limit
    #[arg(long, env = "BOOTSTRAP_CLUSTER", default_value = "local-cluster")]
    bootstrap_cluster: String,

    /// Address the HTTP API listens on
    #[arg(long, env = "AGGREGATOR_ADDRESS", default_value = "0.0.0.0:3010")]
    address: String,

    /// Log requests slower than this many milliseconds as warnings
    #[arg(long, env = "SLOW_LOG", default_value_t = 1000)]
    slow_log: u64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let engine_config = EngineConfig {
        batch_size: args.batch_size,
        slow_log_ms: args.slow_log,
    };
    let admission_config = AdmissionConfig {
        request_limit: args.request_limit,
        large_request_bytes: args.large_request_size,
        large_request_limit: args.large_request_limit,
        bootstrap_cluster: args.bootstrap_cluster.clone(),
    };
    info!("Search indexer starting...");
    info!(db_path = ?args.db_path, address = %args.address, "{engine_config:?}");
    info!("{admission_config:?}");

    let pool = SqlitePool::open(&args.db_path)
        .with_context(|| format!("Failed to open database at {:?}", args.db_path))?;
    let engine = SyncEngine::new(Arc::new(pool), engine_config);
    let app = build_router(AppState::new(
        engine,
        AdmissionController::new(&admission_config),
    ));

    let listener = tokio::net::TcpListener::bind(&args.address)
        .await
        .with_context(|| format!("Failed to bind {}", args.address))?;
    info!("Listening on {}", args.address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Search indexer stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
