//! Vote pipeline configuration from environment variables

use std::env;

/// Configuration for the vote core and its runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct VoteConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Directory holding the `NN_*.sql` schema files
    pub schema_dir: String,

    /// Minutes after `voted_at` during which a vote may still be edited
    pub lock_minutes: i64,

    /// Maximum votes per user in any trailing 24 hours
    pub daily_vote_limit: i64,

    /// Bootstrap free-tier voting for non-premium users
    pub free_voting_enabled: bool,

    /// Distinct matchups a free-tier user may vote on per ISO week
    pub free_weekly_matchups: i64,

    /// TTL for leaderboard / h2h cache entries
    pub leaderboard_cache_ttl_secs: u64,

    /// TTL for the featured-matchup cache entry
    pub featured_cache_ttl_secs: u64,

    /// Lock sweep interval in milliseconds
    pub lock_sweep_interval_ms: u64,

    /// Aggregate recompute interval in milliseconds
    pub recompute_interval_ms: u64,

    /// Run the background schedulers in `vote_runtime`
    pub scheduler_enabled: bool,
}

impl Default for VoteConfig {
    fn default() -> Self {
        Self {
            db_path: "data/compare_vote.db".to_string(),
            schema_dir: "sql".to_string(),
            lock_minutes: 5,
            daily_vote_limit: 50,
            free_voting_enabled: false,
            free_weekly_matchups: 3,
            leaderboard_cache_ttl_secs: 300,
            featured_cache_ttl_secs: 600,
            lock_sweep_interval_ms: 60_000,
            recompute_interval_ms: 900_000,
            scheduler_enabled: true,
        }
    }
}

impl VoteConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `VOTE_DB_PATH` (default: data/compare_vote.db)
    /// - `VOTE_SCHEMA_DIR` (default: sql)
    /// - `VOTE_LOCK_MINUTES` (default: 5)
    /// - `DAILY_VOTE_LIMIT` (default: 50)
    /// - `FREE_VOTING_ENABLED` (default: false)
    /// - `FREE_WEEKLY_MATCHUPS` (default: 3)
    /// - `LEADERBOARD_CACHE_TTL_SECS` (default: 300)
    /// - `FEATURED_CACHE_TTL_SECS` (default: 600)
    /// - `LOCK_SWEEP_INTERVAL_MS` (default: 60000)
    /// - `RECOMPUTE_INTERVAL_MS` (default: 900000)
    /// - `ENABLE_SCHEDULER` (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            db_path: env::var("VOTE_DB_PATH").unwrap_or(defaults.db_path),
            schema_dir: env::var("VOTE_SCHEMA_DIR").unwrap_or(defaults.schema_dir),
            lock_minutes: parse_var("VOTE_LOCK_MINUTES").unwrap_or(defaults.lock_minutes),
            daily_vote_limit: parse_var("DAILY_VOTE_LIMIT").unwrap_or(defaults.daily_vote_limit),
            free_voting_enabled: parse_var("FREE_VOTING_ENABLED")
                .unwrap_or(defaults.free_voting_enabled),
            free_weekly_matchups: parse_var("FREE_WEEKLY_MATCHUPS")
                .unwrap_or(defaults.free_weekly_matchups),
            leaderboard_cache_ttl_secs: parse_var("LEADERBOARD_CACHE_TTL_SECS")
                .unwrap_or(defaults.leaderboard_cache_ttl_secs),
            featured_cache_ttl_secs: parse_var("FEATURED_CACHE_TTL_SECS")
                .unwrap_or(defaults.featured_cache_ttl_secs),
            lock_sweep_interval_ms: parse_var("LOCK_SWEEP_INTERVAL_MS")
                .unwrap_or(defaults.lock_sweep_interval_ms),
            recompute_interval_ms: parse_var("RECOMPUTE_INTERVAL_MS")
                .unwrap_or(defaults.recompute_interval_ms),
            scheduler_enabled: parse_var("ENABLE_SCHEDULER").unwrap_or(defaults.scheduler_enabled),
        }
    }

    /// Lock window in seconds
    pub fn lock_window_secs(&self) -> i64 {
        self.lock_minutes * 60
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
