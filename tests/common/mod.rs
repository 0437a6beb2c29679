//! Shared fixture for integration tests: a migrated temp database, a
//! settable clock and a premium roster.

#![allow(dead_code)]

use compare_vote::aggregation::AggregationEngine;
use compare_vote::cache::LeaderboardCache;
use compare_vote::clock::Clock;
use compare_vote::directory::{insert_post, insert_tool};
use compare_vote::entitlement::PremiumRoster;
use compare_vote::joblog::SqliteJobLog;
use compare_vote::model::{MatchupId, PostId, ToolId, ToolStatus, UserId};
use compare_vote::registry::MatchupRegistry;
use compare_vote::voting::VotePipeline;
use compare_vote::{CompareApi, Database, VoteConfig};
use rusqlite::params;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const SCHEMA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/sql");

/// Wednesday 2024-01-17 12:00:00 UTC
pub const NOW: i64 = 1_705_492_800;

/// Monday 2024-01-22 00:00:00 UTC
pub const NEXT_MONDAY: i64 = 1_705_881_600;

pub const PREMIUM_USER: UserId = 100;
pub const FREE_USER: UserId = 200;

pub struct Fixture {
    pub dir: TempDir,
    pub db: Database,
    pub now: Arc<AtomicI64>,
    pub clock: Clock,
    pub roster: Arc<PremiumRoster>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_and_migrate(dir.path().join("votes.db"), SCHEMA_DIR).unwrap();
        let now = Arc::new(AtomicI64::new(NOW));
        let handle = now.clone();
        let clock: Clock = Arc::new(move || handle.load(Ordering::SeqCst));

        Self {
            dir,
            db,
            now,
            clock,
            roster: Arc::new(PremiumRoster::with_users([PREMIUM_USER])),
        }
    }

    pub fn db_path(&self) -> std::path::PathBuf {
        self.dir.path().join("votes.db")
    }

    pub fn set_now(&self, ts: i64) {
        self.now.store(ts, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn tool(&self, slug: &str, name: &str, status: ToolStatus) -> ToolId {
        let conn = self.db.lock().unwrap();
        insert_tool(&conn, slug, name, status).unwrap()
    }

    pub fn post(&self, tool_id: ToolId) -> PostId {
        let conn = self.db.lock().unwrap();
        insert_post(&conn, tool_id, &format!("Post by tool {}", tool_id), Some("tech"), NOW - 86_400)
            .unwrap()
    }

    pub fn registry(&self) -> MatchupRegistry {
        MatchupRegistry::new(self.db.clone(), self.clock.clone())
    }

    /// Fresh posts for both tools and an active matchup between them
    pub fn matchup(&self, tool_x: ToolId, tool_y: ToolId) -> MatchupId {
        let (px, py) = (self.post(tool_x), self.post(tool_y));
        self.registry().create_matchup(px, py, None).unwrap().unwrap()
    }

    pub fn pipeline(&self, config: VoteConfig) -> VotePipeline {
        VotePipeline::new(self.db.clone(), self.roster.clone(), self.clock.clone(), config)
    }

    pub fn engine(&self) -> (AggregationEngine, Arc<LeaderboardCache>) {
        let cache = Arc::new(LeaderboardCache::new(300, 600, self.clock.clone()));
        let engine = AggregationEngine::new(
            self.db.clone(),
            Arc::new(SqliteJobLog::new(self.db.clone(), self.clock.clone())),
            cache.clone(),
            self.clock.clone(),
            VoteConfig::default().lock_window_secs(),
        );
        (engine, cache)
    }

    pub fn api(&self, config: VoteConfig) -> CompareApi {
        CompareApi::new(
            self.db.clone(),
            self.roster.clone(),
            Arc::new(SqliteJobLog::new(self.db.clone(), self.clock.clone())),
            config,
            self.clock.clone(),
        )
    }

    pub fn count(&self, sql: &str) -> i64 {
        self.db.lock().unwrap().query_row(sql, [], |row| row.get(0)).unwrap()
    }

    /// Shift a user's votes on a matchup into the past
    pub fn backdate_votes(&self, user_id: UserId, matchup_id: MatchupId, secs: i64) {
        self.db
            .lock()
            .unwrap()
            .execute(
                "UPDATE votes SET voted_at = voted_at - ?1 WHERE user_id = ?2 AND matchup_id = ?3",
                params![secs, user_id, matchup_id],
            )
            .unwrap();
    }

    /// Mark every vote locked, as the sweep would once the window passes
    pub fn lock_all(&self) {
        self.db
            .lock()
            .unwrap()
            .execute("UPDATE votes SET locked = 1 WHERE locked = 0", [])
            .unwrap();
    }

    /// Insert a locked vote directly, bypassing the pipeline
    pub fn locked_vote(
        &self,
        user_id: UserId,
        matchup_id: MatchupId,
        category: &str,
        winner: ToolId,
        voted_at: i64,
    ) {
        self.db
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO votes
                    (user_id, matchup_id, category, winner_tool, position_a_was_left, voted_at, locked)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, 1)",
                params![user_id, matchup_id, category, winner, voted_at],
            )
            .unwrap();
    }
}

/// ChatGPT (id 1) and Claude (id 2), both active
pub fn two_tools(fx: &Fixture) -> (ToolId, ToolId) {
    (
        fx.tool("chatgpt", "ChatGPT", ToolStatus::Active),
        fx.tool("claude", "Claude", ToolStatus::Active),
    )
}

pub fn free_config(weekly: i64) -> VoteConfig {
    VoteConfig {
        free_voting_enabled: true,
        free_weekly_matchups: weekly,
        ..VoteConfig::default()
    }
}
