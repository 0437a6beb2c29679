//! Recompute Stats - one-shot cron entry point
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin recompute_stats -- --job all
//! ```
//!
//! Jobs:
//! - `tool` - rebuild `tool_stats`
//! - `h2h` - rebuild `h2h_stats`
//! - `users` - refresh stale `user_vote_stats`
//! - `all` - all three (default)
//! - `lock` - lock votes past their edit window
//! - `backfill` - create missing matchups between active tools
//!
//! The job summary is printed to stdout as JSON; logs go to stderr.

use compare_vote::aggregation::AggregationEngine;
use compare_vote::cache::LeaderboardCache;
use compare_vote::clock::system_clock;
use compare_vote::joblog::SqliteJobLog;
use compare_vote::ledger::VoteLedger;
use compare_vote::registry::MatchupRegistry;
use compare_vote::{Database, VoteConfig};
use dotenv::dotenv;
use serde_json::{json, Value};
use std::env;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Job {
    Tool,
    H2h,
    Users,
    All,
    Lock,
    Backfill,
}

fn parse_job_from_args() -> Result<Job, String> {
    let args: Vec<String> = env::args().collect();
    let Some(idx) = args.iter().position(|x| x == "--job") else {
        return Ok(Job::All);
    };

    match args.get(idx + 1).map(|s| s.as_str()) {
        Some("tool") => Ok(Job::Tool),
        Some("h2h") => Ok(Job::H2h),
        Some("users") => Ok(Job::Users),
        Some("all") => Ok(Job::All),
        Some("lock") => Ok(Job::Lock),
        Some("backfill") => Ok(Job::Backfill),
        Some(other) => Err(format!("unknown job '{}'", other)),
        None => Err("--job needs a value".to_string()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let job = parse_job_from_args()?;
    let config = VoteConfig::from_env();
    let clock = system_clock();

    log::info!("🔧 Recompute job {:?} on {}", job, config.db_path);
    let db = Database::open_and_migrate(&config.db_path, &config.schema_dir)?;

    let engine = AggregationEngine::new(
        db.clone(),
        Arc::new(SqliteJobLog::new(db.clone(), clock.clone())),
        Arc::new(LeaderboardCache::new(
            config.leaderboard_cache_ttl_secs,
            config.featured_cache_ttl_secs,
            clock.clone(),
        )),
        clock.clone(),
        config.lock_window_secs(),
    );

    let summary: Value = match job {
        Job::Tool => serde_json::to_value(engine.recompute_tool_stats()?)?,
        Job::H2h => serde_json::to_value(engine.recompute_h2h_stats()?)?,
        Job::Users => serde_json::to_value(engine.recompute_stale_user_stats()?)?,
        Job::All => serde_json::to_value(engine.recompute_all()?)?,
        Job::Lock => {
            let ledger = VoteLedger::new(db.clone(), clock, config.lock_window_secs());
            json!({ "votes_locked": ledger.lock_expired_votes()? })
        }
        Job::Backfill => {
            let registry = MatchupRegistry::new(db.clone(), clock);
            json!({ "matchups_created": registry.backfill_matchups()? })
        }
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
