//! Vote Runtime - background maintenance for the Compare & Vote core
//!
//! - Opens (and migrates) the SQLite database
//! - Spawns the lock sweep and the periodic aggregate recompute
//! - Runs until CTRL+C
//!
//! Usage:
//!   cargo run --release --bin vote_runtime
//!
//! Environment variables:
//!   VOTE_DB_PATH - SQLite database path (default: data/compare_vote.db)
//!   VOTE_SCHEMA_DIR - Schema directory (default: sql)
//!   VOTE_LOCK_MINUTES - Edit window in minutes (default: 5)
//!   LOCK_SWEEP_INTERVAL_MS - Lock sweep interval (default: 60000)
//!   RECOMPUTE_INTERVAL_MS - Aggregate recompute interval (default: 900000)
//!   ENABLE_SCHEDULER - Master switch for both tasks (default: true)
//!   RUST_LOG - Logging level (optional, default: info)

use compare_vote::aggregation::AggregationEngine;
use compare_vote::cache::LeaderboardCache;
use compare_vote::clock::system_clock;
use compare_vote::joblog::SqliteJobLog;
use compare_vote::ledger::VoteLedger;
use compare_vote::scheduler::{lock_sweep_task, recompute_task};
use compare_vote::{Database, VoteConfig};
use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Compare & Vote runtime");

    let config = VoteConfig::from_env();
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Schema dir: {}", config.schema_dir);
    info!("   ├─ Lock window: {} min", config.lock_minutes);
    info!("   ├─ Lock sweep interval: {}ms", config.lock_sweep_interval_ms);
    info!("   └─ Recompute interval: {}ms", config.recompute_interval_ms);

    info!("🔧 Initializing database...");
    let db = Database::open_and_migrate(&config.db_path, &config.schema_dir)?;
    info!("✅ Database initialized");

    if !config.scheduler_enabled {
        info!("⚠️  Scheduler is DISABLED (set ENABLE_SCHEDULER=true to activate)");
        info!("   └─ Exiting gracefully...");
        return Ok(());
    }

    let clock = system_clock();
    let ledger = Arc::new(VoteLedger::new(
        db.clone(),
        clock.clone(),
        config.lock_window_secs(),
    ));
    let cache = Arc::new(LeaderboardCache::new(
        config.leaderboard_cache_ttl_secs,
        config.featured_cache_ttl_secs,
        clock.clone(),
    ));
    let engine = Arc::new(AggregationEngine::new(
        db.clone(),
        Arc::new(SqliteJobLog::new(db.clone(), clock.clone())),
        cache,
        clock,
        config.lock_window_secs(),
    ));

    info!("🚀 Spawning background tasks...");
    let sweep = tokio::spawn(lock_sweep_task(ledger, config.lock_sweep_interval_ms));
    info!("   ├─ ✅ Lock sweep spawned");
    let recompute = tokio::spawn(recompute_task(engine, config.recompute_interval_ms));
    info!("   └─ ✅ Recompute spawned");

    info!("🔄 Press CTRL+C to shutdown gracefully");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("");
            info!("⚠️  Received CTRL+C, shutting down...");
        }
        Err(err) => {
            error!("❌ Failed to listen for CTRL+C: {}", err);
        }
    }

    sweep.abort();
    recompute.abort();

    info!("✅ Vote runtime stopped");
    Ok(())
}
