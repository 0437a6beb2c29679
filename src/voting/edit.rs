//! Batch PATCH, transactional half
//!
//! Lock enforcement does not depend on the sweep: any requested vote whose
//! age exceeds the lock window is flipped to locked here (with a `lock`
//! audit event) and the edit is refused. The caller commits that flip
//! together with the `reject` event.

use super::{
    check_winners, edit_window, event_metadata, load_active_matchup, premium_required,
    vote_locked, ValidVote, VoteBatch, VoteOutcome,
};
use crate::audit::{record_event, VoteEvent};
use crate::config::VoteConfig;
use crate::error::{ErrorCode, VoteError, VoteRejection};
use crate::ledger;
use crate::model::{Category, VoteEventType, VoteId};
use rusqlite::Transaction;
use serde_json::json;

pub(super) fn run(
    tx: &mut Transaction<'_>,
    config: &VoteConfig,
    batch: &VoteBatch,
    votes: &[ValidVote],
    premium: bool,
    now: i64,
) -> Result<VoteOutcome, VoteError> {
    // Edits never consume free allowance, but need a prior vote on this matchup
    if !premium
        && !(config.free_voting_enabled
            && ledger::has_voted_on_matchup(tx, batch.user_id, batch.matchup_id)?)
    {
        return Err(premium_required().into());
    }

    let matchup = load_active_matchup(tx, batch.matchup_id)?;
    check_winners(&matchup, votes)?;

    let categories: Vec<Category> = votes.iter().map(|v| v.category).collect();
    let existing = ledger::existing_votes(tx, batch.user_id, batch.matchup_id, &categories)?;

    if let Some(missing) = votes.iter().find(|v| !existing.contains_key(&v.category)) {
        return Err(VoteRejection::new(
            ErrorCode::NewVoteViaPatch,
            format!("No existing {} vote to edit; submit it instead", missing.category),
        )
        .with_details(json!({ "category": missing.category }))
        .into());
    }

    // Real-time lock check
    let window = config.lock_window_secs();
    let mut first_locked = None;
    for v in votes {
        let current = &existing[&v.category];
        let expired = now - current.voted_at > window;
        if !current.locked && !expired {
            continue;
        }
        if !current.locked && ledger::lock_vote(tx, current.vote_id)? {
            let event = VoteEvent::new(VoteEventType::Lock, batch.user_id, batch.matchup_id)
                .category(v.category)
                .metadata(json!({
                    "vote_id": current.vote_id,
                    "age_seconds": now - current.voted_at,
                    "trigger": "edit",
                }));
            record_event(tx, &event, now)?;
            log::info!(
                "🔒 Locked vote {} on edit attempt (age {}s)",
                current.vote_id,
                now - current.voted_at
            );
        }
        first_locked.get_or_insert(v.category);
    }
    if let Some(category) = first_locked {
        return Err(vote_locked(category).into());
    }

    let vote_ids: Vec<_> = votes.iter().map(|v| existing[&v.category].vote_id).collect();
    let changed: Vec<&ValidVote> = votes
        .iter()
        .filter(|v| existing[&v.category].winner_tool != v.winner_tool)
        .collect();

    if changed.is_empty() {
        let event = VoteEvent::new(VoteEventType::Edit, batch.user_id, batch.matchup_id)
            .categories(categories.iter().map(|c| c.as_str()))
            .metadata(event_metadata(batch, json!({ "changed": [], "noop": true }))?);
        record_event(tx, &event, now)?;

        return Ok(VoteOutcome {
            vote_ids,
            edit_window_expires_at: None,
            created: false,
        });
    }

    let updates: Vec<(VoteId, ValidVote)> = changed
        .iter()
        .map(|v| (existing[&v.category].vote_id, **v))
        .collect();
    apply_winner_changes(tx, &updates, batch.position_a_left, now)?;

    let changed_categories: Vec<Category> = changed.iter().map(|v| v.category).collect();
    let event = VoteEvent::new(VoteEventType::Edit, batch.user_id, batch.matchup_id)
        .categories(categories.iter().map(|c| c.as_str()))
        .metadata(event_metadata(batch, json!({ "changed": changed_categories, "noop": false }))?);
    record_event(tx, &event, now)?;

    Ok(VoteOutcome {
        vote_ids,
        edit_window_expires_at: edit_window(config, now),
        created: false,
    })
}

/// Re-verify `locked = 0` at write time. A lost race discards the whole batch.
fn apply_winner_changes(
    tx: &mut Transaction<'_>,
    updates: &[(VoteId, ValidVote)],
    position_a_left: bool,
    now: i64,
) -> Result<(), VoteError> {
    let sp = tx.savepoint()?;
    for (vote_id, v) in updates {
        if !ledger::update_unlocked_winner(&sp, *vote_id, v.winner_tool, position_a_left, now)? {
            // sp dropped without commit: rolled back
            return Err(vote_locked(v.category).into());
        }
    }
    sp.commit()?;
    Ok(())
}
