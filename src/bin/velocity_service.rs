//! Velocity Service - production runtime
//!
//! - Initializes SQLite database with schema
//! - Builds the in-process bus and registers every handler
//! - Bridges JSONL on stdin onto the bus (replies on stdout)
//! - On stdin EOF drains every buffered event into the store, then stops
//! - Ctrl-C stops immediately
//!
//! Usage:
//!   cargo run --release --bin velocity_service < events.jsonl
//!
//! Environment variables:
//!   VELOCITY_DB_PATH - SQLite database path (default: velocity.db)
//!   VELOCITY_SCHEMA_DIR - schema directory (default: sql)
//!   TEST_MODE - registers insights.store.drop (default: false)
//!   VELOCITY_SCORING - scoring policy (default: trailing_mean_delta)
//!   REQUEST_TIMEOUT_MS - bridge request deadline (default: 5000)

use dotenv::dotenv;
use log::{error, info, warn};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::io::BufReader;
use velocity::bridge::run_bridge;
use velocity::store::run_schema_migrations;
use velocity::{InMemoryTransport, Service, ServiceConfig, SqliteCounterStore, Transport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize environment and logging (stderr; stdout carries replies)
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = ServiceConfig::from_env();

    // Run schema migrations from disk when present (idempotent)
    if Path::new(&config.schema_dir).exists() {
        let mut conn = Connection::open(&config.db_path)?;
        run_schema_migrations(&mut conn, &config.schema_dir)?;
        drop(conn);
    } else {
        warn!(
            "⚠️  Schema directory {} not found, using embedded schema",
            config.schema_dir
        );
    }

    let store = Arc::new(SqliteCounterStore::open(&config.db_path)?);
    let transport = Arc::new(InMemoryTransport::new(config.channel_buffer));
    let service = Service::new(config, store, transport.clone())?;

    let config = service.config();
    info!("🚀 Velocity Service");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Queue group: {}", config.queue_group);
    info!("   ├─ Channel buffer: {} messages", config.channel_buffer);
    info!("   ├─ Request timeout: {}ms", config.request_timeout_ms);
    info!("   ├─ Scoring: {}", service.engine().policy_name());
    info!("   ├─ Max range: {} days", config.max_range_days);
    info!("   └─ Test mode: {}", config.test_mode);

    let dispatcher = service.start()?;
    info!("✅ Service ready, reading JSONL from stdin");

    let bus = service.bus().clone();
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    let interrupted = tokio::select! {
        result = run_bridge(&bus, stdin, stdout) => {
            match result {
                Ok(_) => info!("📭 stdin closed, draining"),
                Err(e) => error!("❌ Bridge failed: {}", e),
            }
            false
        }
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Ctrl-C received");
            true
        }
    };

    if interrupted {
        dispatcher.shutdown().await;
    } else {
        service.drain(dispatcher).await;
    }
    transport.close();
    info!("✅ Velocity Service stopped");

    Ok(())
}
