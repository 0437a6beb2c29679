//! Vote Ledger
//!
//! Row-level primitives over the `votes` table. The free functions take an
//! already-held `&Connection` so the submit/edit pipelines can run them
//! inside their own IMMEDIATE transaction; [`VoteLedger`] wraps the
//! standalone operations (lock sweep, read helpers) for everyone else.
//!
//! Every mutating statement carries `AND locked = 0`. The
//! `trg_votes_locked_frozen` trigger backs this up at the schema level.

use crate::clock::Clock;
use crate::db::Database;
use crate::error::StoreError;
use crate::model::{Category, MatchupId, ToolId, UserId, Vote, VoteId};
use rusqlite::{params, Connection};
use std::collections::{BTreeMap, HashMap};

/// All of a user's votes on one matchup, in category order
pub fn user_votes_for_matchup(
    conn: &Connection,
    user_id: UserId,
    matchup_id: MatchupId,
) -> rusqlite::Result<Vec<Vote>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM votes WHERE user_id = ?1 AND matchup_id = ?2 ORDER BY vote_id",
        Vote::COLUMNS
    ))?;
    let votes = stmt
        .query_map(params![user_id, matchup_id], Vote::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(votes)
}

/// Existing votes keyed by category, restricted to `categories`
pub fn existing_votes(
    conn: &Connection,
    user_id: UserId,
    matchup_id: MatchupId,
    categories: &[Category],
) -> rusqlite::Result<HashMap<Category, Vote>> {
    Ok(user_votes_for_matchup(conn, user_id, matchup_id)?
        .into_iter()
        .filter(|v| categories.contains(&v.category))
        .map(|v| (v.category, v))
        .collect())
}

pub fn has_voted_on_matchup(
    conn: &Connection,
    user_id: UserId,
    matchup_id: MatchupId,
) -> rusqlite::Result<bool> {
    let mut stmt =
        conn.prepare_cached("SELECT 1 FROM votes WHERE user_id = ?1 AND matchup_id = ?2 LIMIT 1")?;
    stmt.exists(params![user_id, matchup_id])
}

/// Votes cast (or last edited) by the user at or after `since`
pub fn count_votes_since(conn: &Connection, user_id: UserId, since: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM votes WHERE user_id = ?1 AND voted_at >= ?2",
        params![user_id, since],
        |row| row.get(0),
    )
}

/// Distinct matchups the user has voted on at or after `since`
pub fn count_distinct_matchups_since(
    conn: &Connection,
    user_id: UserId,
    since: i64,
) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(DISTINCT matchup_id) FROM votes WHERE user_id = ?1 AND voted_at >= ?2",
        params![user_id, since],
        |row| row.get(0),
    )
}

pub fn insert_vote(
    conn: &Connection,
    user_id: UserId,
    matchup_id: MatchupId,
    category: Category,
    winner_tool: ToolId,
    position_a_was_left: bool,
    voted_at: i64,
) -> rusqlite::Result<VoteId> {
    conn.execute(
        "INSERT INTO votes
            (user_id, matchup_id, category, winner_tool, position_a_was_left, voted_at, locked)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
        params![user_id, matchup_id, category, winner_tool, position_a_was_left, voted_at],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Change the winner of a still-unlocked vote. Returns false if the row was
/// locked (or gone) by the time the update ran.
pub fn update_unlocked_winner(
    conn: &Connection,
    vote_id: VoteId,
    winner_tool: ToolId,
    position_a_was_left: bool,
    voted_at: i64,
) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "UPDATE votes SET winner_tool = ?1, position_a_was_left = ?2, voted_at = ?3
         WHERE vote_id = ?4 AND locked = 0",
        params![winner_tool, position_a_was_left, voted_at, vote_id],
    )?;
    Ok(n == 1)
}

/// Flip one vote to locked. Returns true if this call did the flip.
pub fn lock_vote(conn: &Connection, vote_id: VoteId) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "UPDATE votes SET locked = 1 WHERE vote_id = ?1 AND locked = 0",
        params![vote_id],
    )?;
    Ok(n == 1)
}

/// Lock every unlocked vote with `voted_at < cutoff`
pub fn lock_votes_before(conn: &Connection, cutoff: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE votes SET locked = 1 WHERE locked = 0 AND voted_at < ?1",
        params![cutoff],
    )
}

/// category → winner tool → votes, for one matchup (all votes, locked or not)
pub fn matchup_vote_counts(
    conn: &Connection,
    matchup_id: MatchupId,
) -> rusqlite::Result<BTreeMap<Category, HashMap<ToolId, i64>>> {
    let mut stmt = conn.prepare_cached(
        "SELECT category, winner_tool, COUNT(*) FROM votes
         WHERE matchup_id = ?1 GROUP BY category, winner_tool",
    )?;
    let mut counts: BTreeMap<Category, HashMap<ToolId, i64>> = BTreeMap::new();
    let rows = stmt.query_map(params![matchup_id], |row| {
        Ok((row.get::<_, Category>(0)?, row.get::<_, ToolId>(1)?, row.get::<_, i64>(2)?))
    })?;
    for row in rows {
        let (category, tool, n) = row?;
        counts.entry(category).or_default().insert(tool, n);
    }
    Ok(counts)
}

pub fn matchup_total_votes(conn: &Connection, matchup_id: MatchupId) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM votes WHERE matchup_id = ?1",
        params![matchup_id],
        |row| row.get(0),
    )
}

/// Standalone ledger operations
pub struct VoteLedger {
    db: Database,
    clock: Clock,
    lock_window_secs: i64,
}

impl VoteLedger {
    pub fn new(db: Database, clock: Clock, lock_window_secs: i64) -> Self {
        Self {
            db,
            clock,
            lock_window_secs,
        }
    }

    /// Maintenance sweep: lock every unlocked vote older than the lock
    /// window. Idempotent. Returns the number of rows flipped.
    pub fn lock_expired_votes(&self) -> Result<usize, StoreError> {
        let cutoff = (self.clock)() - self.lock_window_secs;
        let conn = self.db.lock()?;
        let locked = lock_votes_before(&conn, cutoff)?;

        if locked > 0 {
            log::info!("🔒 Lock sweep locked {} expired votes", locked);
        } else {
            log::debug!("🔒 Lock sweep: nothing to lock");
        }
        Ok(locked)
    }

    pub fn get_user_votes_for_matchup(
        &self,
        user_id: UserId,
        matchup_id: MatchupId,
    ) -> Result<Vec<Vote>, StoreError> {
        let conn = self.db.lock()?;
        Ok(user_votes_for_matchup(&conn, user_id, matchup_id)?)
    }

    pub fn get_matchup_vote_counts(
        &self,
        matchup_id: MatchupId,
    ) -> Result<BTreeMap<Category, HashMap<ToolId, i64>>, StoreError> {
        let conn = self.db.lock()?;
        Ok(matchup_vote_counts(&conn, matchup_id)?)
    }

    pub fn get_matchup_total_votes(&self, matchup_id: MatchupId) -> Result<i64, StoreError> {
        let conn = self.db.lock()?;
        Ok(matchup_total_votes(&conn, matchup_id)?)
    }
}
