//! TPS Runtime - backfill then follow
//!
//! This binary:
//! - Loads configuration and ensures the schema exists
//! - Anchors on the baseline block and backfills history in chunks
//! - Follows the chain head on a fixed timer until CTRL+C
//!
//! Usage:
//!   cargo run --release --bin tps_runtime
//!
//! Environment variables (see `TpsConfig::load` for the full list):
//!   TPS_DB_PATH - SQLite database path (default: /var/lib/tps/chain.db)
//!   TPS_CONFIG_FILE - Optional JSON config file
//!   TPS_INTERVAL_SECS - Window width (default: 60)
//!   TPS_SCAN_INTERVAL_SECS - Follow cadence (default: 300)
//!   RUST_LOG - Logging level (default: info)

use dotenv::dotenv;
use log::{error, info};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::time::Duration;
use tps_aggregator::config::TpsConfig;
use tps_aggregator::pipeline::{spawn_ticker, Clock, Driver, SystemClock};
use tps_aggregator::sqlite_pragma::apply_optimized_pragmas;
use tps_aggregator::tps_core::{schema::ensure_schema, MetricsSink, SqliteBlockSource, SqliteMetricsWriter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 TPS Runtime");

    let config = TpsConfig::load()?;

    info!("📊 Configuration:");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Interval: {}s", config.interval_secs);
    info!("   ├─ Scan interval: {}s", config.scan_interval_secs);
    info!("   ├─ Batch limit: {}s", config.batch_limit_secs);
    info!("   ├─ Backfill chunk: {}s", config.batch_day_interval_secs);
    info!("   ├─ Query concurrency: {}", config.max_query_concurrency);
    info!("   ├─ Insert batch: {} rows", config.max_insert_batch_size);
    info!("   ├─ Blocks: {} / {}", config.confirmed_table, config.unconfirmed_table);
    info!("   ├─ Target: {} {:?}", config.table_name, config.table_columns);
    info!("   └─ Follow failure policy: {:?}", config.follow_failure_policy);

    info!("🔧 Initializing database...");
    let conn = Connection::open(&config.db_path)?;
    apply_optimized_pragmas(&conn)?;
    ensure_schema(&conn, &config)?;
    drop(conn);

    let source = Arc::new(SqliteBlockSource::new(&config)?);
    let sink = Arc::new(SqliteMetricsWriter::new(&config)?);
    info!("📊 Backend: {}", sink.backend_type());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let driver = Driver::new(&config, source, sink, clock.clone());

    // Init + backfill run to completion before any tick is scheduled
    let state = match driver.start().await {
        Ok(state) => state,
        Err(e) => {
            error!("❌ Startup failed: {}", e);
            return Err(e.into());
        }
    };

    let (ticker, ticks) = spawn_ticker(Duration::from_secs(config.scan_interval_secs), clock);

    info!("🔄 Press CTRL+C to shutdown gracefully");

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
            Err(err) => {
                error!("❌ Failed to listen for CTRL+C: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    let result = driver.follow_until(state, ticks, shutdown).await;

    ticker.abort();

    match result {
        Ok(state) => {
            info!("✅ TPS runtime stopped (last mark: {})", state.last_mark);
            Ok(())
        }
        Err(e) => {
            error!("❌ Follow loop failed: {}", e);
            Err(e.into())
        }
    }
}
