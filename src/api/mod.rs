//! Public read/write surface consumed by the UI layer
//!
//! Every endpoint returns an [`ApiResponse`]: an HTTP-equivalent status and a
//! JSON body. Failures use the `{"error": {code, message, details}}`
//! envelope from [`VoteRejection::envelope`]. The HTTP server itself lives
//! outside this crate.

mod history;
mod leaderboard;
mod votes;

use crate::aggregation::AggregationEngine;
use crate::cache::{Cached, LeaderboardCache};
use crate::clock::Clock;
use crate::config::VoteConfig;
use crate::db::Database;
use crate::entitlement::EntitlementOracle;
use crate::error::{ErrorCode, StoreError, VoteRejection};
use crate::joblog::JobLog;
use crate::ledger::VoteLedger;
use crate::model::{Category, UserId};
use crate::registry::MatchupRegistry;
use crate::voting::VotePipeline;
use serde_json::{json, Value};
use std::sync::Arc;

pub use history::HistoryQuery;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn with_status(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn error(rejection: &VoteRejection) -> Self {
        Self {
            status: rejection.status(),
            body: rejection.envelope(),
        }
    }

    /// Cached payload plus `cached` / `cache_age_seconds`
    fn cached(cached: Cached) -> Self {
        let Cached {
            value: mut body,
            age_secs,
        } = cached;
        if let Value::Object(map) = &mut body {
            map.insert("cached".to_string(), json!(age_secs.is_some()));
            map.insert("cache_age_seconds".to_string(), json!(age_secs.unwrap_or(0)));
        }
        Self::ok(body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Error code from the envelope, if this is an error response
    pub fn error_code(&self) -> Option<&str> {
        self.body["error"]["code"].as_str()
    }
}

/// Collapse an infrastructure failure into `INTERNAL_ERROR`, keeping the
/// cause in the log only.
fn internal(context: &str, e: StoreError) -> VoteRejection {
    log::error!("❌ {}: {}", context, e);
    VoteRejection::internal()
}

fn invalid_category(raw: &str) -> VoteRejection {
    let valid: Vec<_> = Category::ALL.iter().map(|c| c.as_str()).collect();
    VoteRejection::new(
        ErrorCode::InvalidCategory,
        format!("Invalid category. Must be one of: {}", valid.join(", ")),
    )
    .with_details(json!({ "category": raw }))
}

fn parse_category(raw: &str) -> Result<Category, VoteRejection> {
    raw.parse().map_err(|_| invalid_category(raw))
}

/// Flatten `Result<ApiResponse, VoteRejection>` endpoint bodies
fn respond(result: Result<ApiResponse, VoteRejection>) -> ApiResponse {
    result.unwrap_or_else(|rejection| ApiResponse::error(&rejection))
}

pub struct CompareApi {
    db: Database,
    registry: MatchupRegistry,
    ledger: VoteLedger,
    pipeline: VotePipeline,
    engine: Arc<AggregationEngine>,
    cache: Arc<LeaderboardCache>,
    entitlements: Arc<dyn EntitlementOracle>,
}

impl CompareApi {
    /// Wire every component onto one database handle and clock
    pub fn new(
        db: Database,
        entitlements: Arc<dyn EntitlementOracle>,
        job_log: Arc<dyn JobLog>,
        config: VoteConfig,
        clock: Clock,
    ) -> Self {
        let cache = Arc::new(LeaderboardCache::new(
            config.leaderboard_cache_ttl_secs,
            config.featured_cache_ttl_secs,
            clock.clone(),
        ));
        let engine = Arc::new(AggregationEngine::new(
            db.clone(),
            job_log,
            cache.clone(),
            clock.clone(),
            config.lock_window_secs(),
        ));

        Self {
            registry: MatchupRegistry::new(db.clone(), clock.clone()),
            ledger: VoteLedger::new(db.clone(), clock.clone(), config.lock_window_secs()),
            pipeline: VotePipeline::new(db.clone(), entitlements.clone(), clock, config),
            db,
            engine,
            cache,
            entitlements,
        }
    }

    pub fn registry(&self) -> &MatchupRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &VoteLedger {
        &self.ledger
    }

    pub fn pipeline(&self) -> &VotePipeline {
        &self.pipeline
    }

    pub fn engine(&self) -> Arc<AggregationEngine> {
        self.engine.clone()
    }

    pub fn cache(&self) -> Arc<LeaderboardCache> {
        self.cache.clone()
    }

    fn require_user(&self, viewer: Option<UserId>) -> Result<UserId, VoteRejection> {
        viewer.ok_or_else(|| VoteRejection::new(ErrorCode::AuthRequired, "Please log in first"))
    }

    fn is_premium(&self, user_id: UserId) -> Result<bool, VoteRejection> {
        self.entitlements
            .is_premium(user_id)
            .map_err(|e| internal("entitlement lookup", e))
    }

    /// Logged in and premium
    fn require_premium(&self, viewer: Option<UserId>) -> Result<UserId, VoteRejection> {
        let user_id = self.require_user(viewer)?;
        if !self.is_premium(user_id)? {
            return Err(VoteRejection::new(
                ErrorCode::PremiumRequired,
                "This feature requires a premium subscription",
            ));
        }
        Ok(user_id)
    }
}
