//! Aggregation Engine
//!
//! Full-rebuild jobs that turn the Vote Ledger into query-optimized summary
//! tables:
//! - `tool_stats`: per (tool, category) win rates with 7-day trend
//! - `h2h_stats`: per (unordered tool pair, category), including pairs with no votes
//! - `user_vote_stats`: per-user profile (single-user refresh + stale sweep)
//!
//! Each rebuild runs in one transaction: either the whole row set is
//! rewritten or nothing is. Jobs are bracketed by the [`JobLog`] sink and,
//! on success, clear the [`LeaderboardCache`].

mod h2h;
mod tool_stats;
mod user_stats;
pub mod window;

pub use user_stats::streaks;

use crate::cache::LeaderboardCache;
use crate::clock::Clock;
use crate::db::Database;
use crate::error::StoreError;
use crate::joblog::JobLog;
use crate::model::{UserId, UserVoteStats};
use rusqlite::TransactionBehavior;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolStatsSummary {
    pub tools_updated: usize,
    pub rows_written: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct H2HSummary {
    pub pairs_updated: usize,
    pub rows_written: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaleUsersSummary {
    pub users_updated: usize,
    pub duration_ms: u64,
}

/// Cron summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecomputeSummary {
    pub tools_updated: usize,
    pub h2h_pairs_updated: usize,
    pub user_stats_updated: usize,
    pub duration_ms: u64,
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

pub struct AggregationEngine {
    db: Database,
    job_log: Arc<dyn JobLog>,
    cache: Arc<LeaderboardCache>,
    clock: Clock,
    lock_window_secs: i64,
}

impl AggregationEngine {
    pub fn new(
        db: Database,
        job_log: Arc<dyn JobLog>,
        cache: Arc<LeaderboardCache>,
        clock: Clock,
        lock_window_secs: i64,
    ) -> Self {
        Self {
            db,
            job_log,
            cache,
            clock,
            lock_window_secs,
        }
    }

    /// Start → run → complete/failure; invalidate the cache on success
    fn run_job<T, F>(&self, job_name: &str, job: F) -> Result<T, StoreError>
    where
        T: Serialize,
        F: FnOnce() -> Result<T, StoreError>,
    {
        let job_id = self.job_log.log_job_start(job_name)?;
        log::info!("⚙️  Job {} started (#{})", job_name, job_id);

        match job() {
            Ok(summary) => {
                let details = serde_json::to_value(&summary)?;
                self.job_log.log_job_complete(job_id, &details)?;
                self.cache.invalidate_all();
                log::info!("✅ Job {} completed: {}", job_name, details);
                Ok(summary)
            }
            Err(e) => {
                log::error!("❌ Job {} failed: {}", job_name, e);
                if let Err(log_err) = self.job_log.log_job_failure(job_id, &e.to_string()) {
                    log::warn!("⚠️  Could not record failure of job #{}: {}", job_id, log_err);
                }
                Err(e)
            }
        }
    }

    pub fn recompute_tool_stats(&self) -> Result<ToolStatsSummary, StoreError> {
        self.run_job("tool_stats", || {
            let started = Instant::now();
            let now = (self.clock)();
            let mut conn = self.db.lock()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let (tools, rows) = tool_stats::rebuild(&tx, now)?;
            tx.commit()?;

            Ok(ToolStatsSummary {
                tools_updated: tools,
                rows_written: rows,
                duration_ms: elapsed_ms(started),
            })
        })
    }

    pub fn recompute_h2h_stats(&self) -> Result<H2HSummary, StoreError> {
        self.run_job("h2h_stats", || {
            let started = Instant::now();
            let now = (self.clock)();
            let mut conn = self.db.lock()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let (pairs, rows) = h2h::rebuild(&tx, now)?;
            tx.commit()?;

            Ok(H2HSummary {
                pairs_updated: pairs,
                rows_written: rows,
                duration_ms: elapsed_ms(started),
            })
        })
    }

    /// Refresh one user's stats. Not job-logged and does not touch the
    /// cache (user stats are never cached).
    pub fn recompute_user_stats(&self, user_id: UserId) -> Result<UserVoteStats, StoreError> {
        let now = (self.clock)();
        let conn = self.db.lock()?;
        let stats = user_stats::compute(&conn, user_id, now)?;
        user_stats::upsert(&conn, &stats)?;
        log::debug!("User {} stats refreshed ({} votes)", user_id, stats.total_votes);
        Ok(stats)
    }

    /// Refresh every user whose stats are missing or out of date
    pub fn recompute_stale_user_stats(&self) -> Result<StaleUsersSummary, StoreError> {
        self.run_job("user_vote_stats", || {
            let started = Instant::now();
            let now = (self.clock)();
            let mut conn = self.db.lock()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let users = user_stats::stale_users(&tx, self.lock_window_secs, now)?;
            for &user_id in &users {
                let stats = user_stats::compute(&tx, user_id, now)?;
                user_stats::upsert(&tx, &stats)?;
            }
            tx.commit()?;

            Ok(StaleUsersSummary {
                users_updated: users.len(),
                duration_ms: elapsed_ms(started),
            })
        })
    }

    /// Cron entry: tool stats, head-to-head, stale users
    pub fn recompute_all(&self) -> Result<RecomputeSummary, StoreError> {
        let started = Instant::now();
        let tools = self.recompute_tool_stats()?;
        let h2h = self.recompute_h2h_stats()?;
        let users = self.recompute_stale_user_stats()?;

        Ok(RecomputeSummary {
            tools_updated: tools.tools_updated,
            h2h_pairs_updated: h2h.pairs_updated,
            user_stats_updated: users.users_updated,
            duration_ms: elapsed_ms(started),
        })
    }

    /// Stored stats for one user, if computed
    pub fn user_stats(&self, user_id: UserId) -> Result<Option<UserVoteStats>, StoreError> {
        let conn = self.db.lock()?;
        Ok(user_stats::load(&conn, user_id)?)
    }
}
