//! Batch POST, transactional half (steps 4-10)

use super::{
    check_free_allowance, check_winners, edit_window, event_metadata, load_active_matchup,
    vote_locked, ValidVote, VoteBatch, VoteOutcome,
};
use crate::audit::{record_event, VoteEvent};
use crate::config::VoteConfig;
use crate::error::{ErrorCode, VoteError, VoteRejection};
use crate::ledger;
use crate::model::{Category, VoteEventType};
use serde_json::json;

pub(super) fn run(
    conn: &rusqlite::Connection,
    config: &VoteConfig,
    batch: &VoteBatch,
    votes: &[ValidVote],
    premium: bool,
    now: i64,
) -> Result<VoteOutcome, VoteError> {
    // 4. Entitlement
    if !premium {
        check_free_allowance(conn, config, batch.user_id, batch.matchup_id, now)?;
    }

    // 5-6. Matchup and winners
    let matchup = load_active_matchup(conn, batch.matchup_id)?;
    check_winners(&matchup, votes)?;

    // 7. Trailing-24h rate limit
    let current = ledger::count_votes_since(conn, batch.user_id, now - 86_400)?;
    let requested = votes.len() as i64;
    if current + requested > config.daily_vote_limit {
        return Err(VoteRejection::new(
            ErrorCode::RateLimited,
            format!("Daily vote limit of {} reached", config.daily_vote_limit),
        )
        .with_details(json!({
            "current": current,
            "limit": config.daily_vote_limit,
            "requested": requested,
        }))
        .into());
    }

    // 8. Existing rows (write lock already held by the IMMEDIATE transaction)
    let categories: Vec<Category> = votes.iter().map(|v| v.category).collect();
    let existing = ledger::existing_votes(conn, batch.user_id, batch.matchup_id, &categories)?;

    if let Some(locked) = votes
        .iter()
        .filter_map(|v| existing.get(&v.category))
        .find(|e| e.locked)
    {
        return Err(vote_locked(locked.category).into());
    }

    let differing: Vec<Category> = votes
        .iter()
        .filter(|v| {
            existing
                .get(&v.category)
                .is_some_and(|e| e.winner_tool != v.winner_tool)
        })
        .map(|v| v.category)
        .collect();
    if !differing.is_empty() {
        return Err(VoteRejection::new(
            ErrorCode::ExistingVotesUsePatch,
            "You already voted differently on this matchup; edit your votes instead",
        )
        .with_details(json!({ "categories": differing }))
        .into());
    }

    // 9. Insert missing categories, reuse identical ones
    let mut vote_ids = Vec::with_capacity(votes.len());
    let mut inserted = 0;
    for v in votes {
        match existing.get(&v.category) {
            Some(e) => vote_ids.push(e.vote_id),
            None => {
                let id = ledger::insert_vote(
                    conn,
                    batch.user_id,
                    batch.matchup_id,
                    v.category,
                    v.winner_tool,
                    batch.position_a_left,
                    now,
                )?;
                vote_ids.push(id);
                inserted += 1;
            }
        }
    }

    // 10. Audit
    let noop = inserted == 0;
    let event = VoteEvent::new(VoteEventType::Submit, batch.user_id, batch.matchup_id)
        .categories(categories.iter().map(|c| c.as_str()))
        .metadata(event_metadata(batch, json!({ "inserted": inserted, "noop": noop }))?);
    record_event(conn, &event, now)?;

    Ok(VoteOutcome {
        vote_ids,
        edit_window_expires_at: if noop { None } else { edit_window(config, now) },
        created: !noop,
    })
}
