//! Vote Submission / Edit pipelines
//!
//! One call = one IMMEDIATE SQLite transaction. The write lock is taken
//! before the existing-vote read, so two concurrent callers for the same
//! (user, matchup) serialize and the second observes the first's committed
//! rows. Any rejection is recorded as a `reject` event in the same
//! transaction that made the decision; no vote rows from a rejected batch
//! are ever committed.
//!
//! Flow:
//! 1. Payload shape, categories, non-null winners (pure)
//! 2. Premium lookup through the [`EntitlementOracle`] (outside the DB lock)
//! 3. Everything else inside the transaction (see `submit` / `edit`)

mod cast;
mod edit;
mod submit;

pub use cast::{CastOutcome, CastStatus};

use crate::audit::{record_event, VoteEvent};
use crate::clock::{self, Clock};
use crate::config::VoteConfig;
use crate::db::Database;
use crate::entitlement::EntitlementOracle;
use crate::error::{ErrorCode, StoreError, VoteError, VoteRejection};
use crate::ledger;
use crate::model::{Category, Matchup, MatchupId, MatchupStatus, ToolId, UserId, VoteEventType, VoteId, VoteMetadata, VoteRequest};
use crate::registry::load_matchup;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Maximum categories per batch (one per fixed category)
pub const MAX_BATCH: usize = Category::ALL.len();

/// One submit/edit call
#[derive(Debug, Clone)]
pub struct VoteBatch {
    pub user_id: UserId,
    pub matchup_id: MatchupId,
    pub votes: Vec<VoteRequest>,
    /// Left/right placement the viewer saw, resolved by the caller
    pub position_a_left: bool,
    pub metadata: VoteMetadata,
}

impl VoteBatch {
    pub fn new(user_id: UserId, matchup_id: MatchupId, votes: Vec<VoteRequest>) -> Self {
        Self {
            user_id,
            matchup_id,
            votes,
            position_a_left: true,
            metadata: VoteMetadata::default(),
        }
    }

    fn raw_categories(&self) -> Vec<&str> {
        self.votes.iter().map(|v| v.category.as_str()).collect()
    }
}

/// Successful submit/edit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteOutcome {
    /// One id per requested category, in request order
    pub vote_ids: Vec<VoteId>,
    /// `None` when the call was an idempotent no-op
    pub edit_window_expires_at: Option<DateTime<Utc>>,
    /// At least one new row was inserted
    #[serde(skip)]
    pub created: bool,
}

impl VoteOutcome {
    /// 201 when rows were created, 200 otherwise
    pub fn status_code(&self) -> u16 {
        if self.created {
            201
        } else {
            200
        }
    }

    pub fn is_noop(&self) -> bool {
        self.edit_window_expires_at.is_none()
    }
}

/// A request entry that passed shape validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ValidVote {
    pub category: Category,
    pub winner_tool: ToolId,
}

pub struct VotePipeline {
    db: Database,
    entitlements: Arc<dyn EntitlementOracle>,
    clock: Clock,
    config: VoteConfig,
}

impl VotePipeline {
    pub fn new(
        db: Database,
        entitlements: Arc<dyn EntitlementOracle>,
        clock: Clock,
        config: VoteConfig,
    ) -> Self {
        Self {
            db,
            entitlements,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &VoteConfig {
        &self.config
    }

    /// Batch POST: atomically accept 1-5 new category votes
    pub fn submit_votes(&self, batch: &VoteBatch) -> Result<VoteOutcome, VoteError> {
        let now = (self.clock)();
        let checked = self.precheck(batch);

        let mut conn = self.db.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let decision = checked.and_then(|(votes, premium)| {
            submit::run(&tx, &self.config, batch, &votes, premium, now)
        });

        self.finish(tx, batch, VoteEventType::Submit, decision, now)
    }

    /// Batch PATCH: atomically change winners of existing, unlocked votes
    pub fn edit_votes(&self, batch: &VoteBatch) -> Result<VoteOutcome, VoteError> {
        let now = (self.clock)();
        let checked = self.precheck(batch);

        let mut conn = self.db.lock()?;
        let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let decision = match checked {
            Ok((votes, premium)) => edit::run(&mut tx, &self.config, batch, &votes, premium, now),
            Err(e) => Err(e),
        };

        self.finish(tx, batch, VoteEventType::Edit, decision, now)
    }

    /// Legacy single-category upsert
    pub fn cast_vote(
        &self,
        user_id: UserId,
        matchup_id: MatchupId,
        category: &str,
        winner_tool: ToolId,
    ) -> Result<CastOutcome, VoteError> {
        let now = (self.clock)();
        let batch = VoteBatch::new(user_id, matchup_id, vec![VoteRequest::new(category, winner_tool)]);
        let checked = self.precheck(&batch);

        let mut conn = self.db.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let decision = checked.and_then(|(votes, premium)| {
            cast::run(&tx, &self.config, &batch, votes[0], premium, now)
        });

        match decision {
            Ok(outcome) => {
                tx.commit()?;
                Ok(outcome)
            }
            Err(VoteError::Rejected(rejection)) => {
                reject(tx, &batch, &rejection, now)?;
                Err(VoteError::Rejected(rejection))
            }
            Err(e) => Err(e),
        }
    }

    /// Pure payload checks, then the oracle. Runs before the DB lock is
    /// taken because an oracle may read the same database.
    fn precheck(&self, batch: &VoteBatch) -> Result<(Vec<ValidVote>, bool), VoteError> {
        let votes = validate_payload(&batch.votes)?;
        let premium = self.entitlements.is_premium(batch.user_id)?;
        Ok((votes, premium))
    }

    fn finish(
        &self,
        tx: Transaction<'_>,
        batch: &VoteBatch,
        kind: VoteEventType,
        decision: Result<VoteOutcome, VoteError>,
        now: i64,
    ) -> Result<VoteOutcome, VoteError> {
        match decision {
            Ok(outcome) => {
                tx.commit()?;
                log::info!(
                    "🗳️  {} user={} matchup={} votes={} status={}",
                    kind,
                    batch.user_id,
                    batch.matchup_id,
                    outcome.vote_ids.len(),
                    outcome.status_code()
                );
                Ok(outcome)
            }
            Err(VoteError::Rejected(rejection)) => {
                reject(tx, batch, &rejection, now)?;
                Err(VoteError::Rejected(rejection))
            }
            Err(VoteError::Store(e)) => {
                // tx dropped here: rolled back
                log::error!(
                    "❌ {} failed for user={} matchup={}: {}",
                    kind,
                    batch.user_id,
                    batch.matchup_id,
                    e
                );
                Err(VoteError::Store(e))
            }
        }
    }
}

/// Record the rejection and commit. Only audit rows and opportunistic lock
/// flips can be pending at this point.
fn reject(
    tx: Transaction<'_>,
    batch: &VoteBatch,
    rejection: &VoteRejection,
    now: i64,
) -> Result<(), StoreError> {
    log::debug!(
        "🚫 Rejected user={} matchup={}: {}",
        batch.user_id,
        batch.matchup_id,
        rejection
    );

    let event = VoteEvent::new(VoteEventType::Reject, batch.user_id, batch.matchup_id)
        .categories(batch.raw_categories())
        .error_code(rejection.code.as_str())
        .metadata(event_metadata(batch, json!({ "details": rejection.details }))?);
    record_event(&tx, &event, now)?;
    tx.commit()?;
    Ok(())
}

/// Client metadata merged with call-specific fields
pub(crate) fn event_metadata(batch: &VoteBatch, extra: Value) -> Result<Value, serde_json::Error> {
    let mut meta = serde_json::to_value(&batch.metadata)?;
    if let (Value::Object(map), Value::Object(extra)) = (&mut meta, extra) {
        map.insert("batch_size".to_string(), json!(batch.votes.len()));
        map.extend(extra);
    }
    Ok(meta)
}

/// Steps 1-3: shape, duplicate categories, category membership, non-null winners
pub(crate) fn validate_payload(votes: &[VoteRequest]) -> Result<Vec<ValidVote>, VoteRejection> {
    if votes.is_empty() || votes.len() > MAX_BATCH {
        return Err(VoteRejection::new(
            ErrorCode::InvalidPayload,
            format!("A batch must contain between 1 and {} votes", MAX_BATCH),
        )
        .with_details(json!({ "count": votes.len(), "max": MAX_BATCH })));
    }

    let mut seen = HashSet::new();
    for v in votes {
        if !seen.insert(v.category.as_str()) {
            return Err(VoteRejection::new(
                ErrorCode::DuplicateCategory,
                format!("Category '{}' appears more than once", v.category),
            )
            .with_details(json!({ "category": v.category })));
        }
    }

    let mut categories = Vec::with_capacity(votes.len());
    for v in votes {
        let category: Category = v.category.parse().map_err(|_| {
            VoteRejection::new(
                ErrorCode::InvalidCategory,
                format!("Unknown category '{}'", v.category),
            )
            .with_details(json!({
                "category": v.category,
                "valid": Category::ALL.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
            }))
        })?;
        categories.push(category);
    }

    votes
        .iter()
        .zip(categories)
        .map(|(v, category)| match v.winner_tool {
            Some(winner_tool) => Ok(ValidVote {
                category,
                winner_tool,
            }),
            None => Err(VoteRejection::new(
                ErrorCode::InvalidWinner,
                format!("Missing winner for {}", category),
            )
            .with_details(json!({ "category": category }))),
        })
        .collect()
}

/// Step 4 for new votes: premium, or a free-tier slot for this week.
/// Re-voting on a matchup the user already voted on never takes a new slot.
pub(crate) fn check_free_allowance(
    conn: &Connection,
    config: &VoteConfig,
    user_id: UserId,
    matchup_id: MatchupId,
    now: i64,
) -> Result<(), VoteError> {
    if !config.free_voting_enabled {
        return Err(premium_required().into());
    }
    if ledger::has_voted_on_matchup(conn, user_id, matchup_id)? {
        return Ok(());
    }

    let used = ledger::count_distinct_matchups_since(conn, user_id, clock::week_start(now))?;
    if used >= config.free_weekly_matchups {
        let resets_at = clock::to_datetime(clock::next_week_start(now));
        return Err(VoteRejection::new(
            ErrorCode::FreeLimitReached,
            format!(
                "Free voting is limited to {} matchups per week",
                config.free_weekly_matchups
            ),
        )
        .with_details(json!({
            "used": used,
            "limit": config.free_weekly_matchups,
            "resets_at": resets_at,
        }))
        .into());
    }
    Ok(())
}

pub(crate) fn premium_required() -> VoteRejection {
    VoteRejection::new(
        ErrorCode::PremiumRequired,
        "A premium subscription is required to vote",
    )
}

/// Step 5: matchup exists and is active
pub(crate) fn load_active_matchup(conn: &Connection, matchup_id: MatchupId) -> Result<Matchup, VoteError> {
    let matchup = load_matchup(conn, matchup_id)?.ok_or_else(|| {
        VoteRejection::new(ErrorCode::MatchupNotFound, "Matchup not found")
            .with_details(json!({ "matchup_id": matchup_id }))
    })?;

    if matchup.status != MatchupStatus::Active {
        return Err(VoteRejection::new(
            ErrorCode::MatchupInactive,
            "This matchup is no longer accepting votes",
        )
        .with_details(json!({ "matchup_id": matchup_id, "status": matchup.status }))
        .into());
    }
    Ok(matchup)
}

/// Step 6: every winner is one of the matchup's two tools
pub(crate) fn check_winners(matchup: &Matchup, votes: &[ValidVote]) -> Result<(), VoteRejection> {
    match votes.iter().find(|v| !matchup.has_tool(v.winner_tool)) {
        Some(v) => Err(VoteRejection::new(
            ErrorCode::InvalidWinner,
            format!("Winner for {} is not part of this matchup", v.category),
        )
        .with_details(json!({
            "category": v.category,
            "winner_tool": v.winner_tool,
            "valid": [matchup.tool_a, matchup.tool_b],
        }))),
        None => Ok(()),
    }
}

pub(crate) fn vote_locked(category: Category) -> VoteRejection {
    VoteRejection::new(
        ErrorCode::VoteLocked,
        format!("Your {} vote is locked and can no longer be changed", category),
    )
    .with_details(json!({ "category": category }))
}

pub(crate) fn edit_window(config: &VoteConfig, now: i64) -> Option<DateTime<Utc>> {
    clock::to_datetime(now + config.lock_window_secs())
}
