//! Legacy single-category vote, superseded by the batch pipeline

use super::{
    check_free_allowance, check_winners, event_metadata, load_active_matchup, ValidVote,
    VoteBatch,
};
use crate::audit::{record_event, VoteEvent};
use crate::config::VoteConfig;
use crate::error::VoteError;
use crate::model::{VoteEventType, VoteId};
use crate::registry::position_a_is_left;
use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CastStatus {
    /// Inserted, or an unlocked vote was overwritten
    Recorded,
    /// An existing locked vote blocked the write; its id is returned
    Locked,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CastOutcome {
    pub vote_id: VoteId,
    pub status: CastStatus,
}

pub(super) fn run(
    conn: &Connection,
    config: &VoteConfig,
    batch: &VoteBatch,
    vote: ValidVote,
    premium: bool,
    now: i64,
) -> Result<CastOutcome, VoteError> {
    if !premium {
        check_free_allowance(conn, config, batch.user_id, batch.matchup_id, now)?;
    }

    let matchup = load_active_matchup(conn, batch.matchup_id)?;
    check_winners(&matchup, &[vote])?;

    let a_left = position_a_is_left(matchup.position_seed, batch.user_id);

    // Upsert only while the existing row (if any) is unlocked
    let written = conn.execute(
        "INSERT INTO votes
            (user_id, matchup_id, category, winner_tool, position_a_was_left, voted_at, locked)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
         ON CONFLICT (user_id, matchup_id, category) DO UPDATE SET
            winner_tool = excluded.winner_tool,
            position_a_was_left = excluded.position_a_was_left,
            voted_at = excluded.voted_at
         WHERE votes.locked = 0",
        params![batch.user_id, batch.matchup_id, vote.category, vote.winner_tool, a_left, now],
    )?;

    let vote_id: VoteId = conn.query_row(
        "SELECT vote_id FROM votes WHERE user_id = ?1 AND matchup_id = ?2 AND category = ?3",
        params![batch.user_id, batch.matchup_id, vote.category],
        |row| row.get(0),
    )?;

    let status = if written == 0 {
        CastStatus::Locked
    } else {
        CastStatus::Recorded
    };

    let event = match status {
        CastStatus::Recorded => VoteEvent::new(VoteEventType::Submit, batch.user_id, batch.matchup_id)
            .category(vote.category)
            .metadata(event_metadata(batch, json!({ "legacy": true }))?),
        CastStatus::Locked => VoteEvent::new(VoteEventType::Reject, batch.user_id, batch.matchup_id)
            .category(vote.category)
            .error_code("VOTE_LOCKED")
            .metadata(event_metadata(batch, json!({ "legacy": true, "vote_id": vote_id }))?),
    };
    record_event(conn, &event, now)?;

    Ok(CastOutcome { vote_id, status })
}
