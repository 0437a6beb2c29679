//! Per-user voting profile
//!
//! Totals, category and streaks count every vote the user cast. Majority
//! agreement and favorite tool only look at locked votes, since unlocked
//! ones may still change.

use crate::clock::utc_date;
use crate::model::{Category, ToolId, UserId, UserVoteStats};
use chrono::{Duration, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;

/// (current, longest) daily streak over ascending distinct dates.
///
/// The current streak only counts if the latest date is today or
/// yesterday; it then runs back over consecutive days.
pub fn streaks(dates: &[NaiveDate], today: NaiveDate) -> (i64, i64) {
    if dates.is_empty() {
        return (0, 0);
    }

    let mut longest = 1;
    let mut run = 1;
    for pair in dates.windows(2) {
        if pair[1] - pair[0] == Duration::days(1) {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 1;
        }
    }

    let last = dates[dates.len() - 1];
    let current = if today - last <= Duration::days(1) { run } else { 0 };

    (current, longest)
}

/// Compute one user's stats from the ledger (no write)
pub(crate) fn compute(conn: &Connection, user_id: UserId, now: i64) -> rusqlite::Result<UserVoteStats> {
    let (total_votes, total_matchups, last_voted_at): (i64, i64, Option<i64>) = conn.query_row(
        "SELECT COUNT(*), COUNT(DISTINCT matchup_id), MAX(voted_at) FROM votes WHERE user_id = ?1",
        params![user_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    // Community majority per (matchup, category), ties to the lower tool id
    let (locked_votes, majority_agreement): (i64, i64) = conn.query_row(
        "WITH counts AS (
             SELECT matchup_id, category, winner_tool, COUNT(*) AS n
             FROM votes WHERE locked = 1
             GROUP BY matchup_id, category, winner_tool
         ), ranked AS (
             SELECT matchup_id, category, winner_tool,
                    ROW_NUMBER() OVER (
                        PARTITION BY matchup_id, category
                        ORDER BY n DESC, winner_tool ASC
                    ) AS rn
             FROM counts
         )
         SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN r.winner_tool = v.winner_tool THEN 1 ELSE 0 END), 0)
         FROM votes v
         JOIN ranked r
           ON r.matchup_id = v.matchup_id AND r.category = v.category AND r.rn = 1
         WHERE v.user_id = ?1 AND v.locked = 1",
        params![user_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let favorite: Option<(ToolId, i64)> = conn
        .query_row(
            "SELECT winner_tool, COUNT(*) AS n FROM votes
             WHERE user_id = ?1 AND locked = 1
             GROUP BY winner_tool ORDER BY n DESC, winner_tool ASC LIMIT 1",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let most_voted_category: Option<Category> = conn
        .query_row(
            "SELECT category, COUNT(*) AS n FROM votes WHERE user_id = ?1
             GROUP BY category ORDER BY n DESC, category ASC LIMIT 1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;

    let mut stmt = conn.prepare_cached("SELECT voted_at FROM votes WHERE user_id = ?1")?;
    let dates: BTreeSet<NaiveDate> = stmt
        .query_map(params![user_id], |row| row.get::<_, i64>(0))?
        .map(|ts| ts.map(utc_date))
        .collect::<rusqlite::Result<_>>()?;
    let dates: Vec<NaiveDate> = dates.into_iter().collect();
    let (current_streak, longest_streak) = streaks(&dates, utc_date(now));

    Ok(UserVoteStats {
        user_id,
        total_votes,
        total_matchups,
        majority_agreement,
        majority_rate: if locked_votes > 0 {
            Some(majority_agreement as f64 / locked_votes as f64)
        } else {
            None
        },
        favorite_tool_id: favorite.map(|(tool, _)| tool),
        favorite_tool_votes: favorite.map_or(0, |(_, n)| n),
        most_voted_category,
        current_streak,
        longest_streak,
        last_voted_at,
        computed_at: now,
    })
}

pub(crate) fn upsert(conn: &Connection, stats: &UserVoteStats) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO user_vote_stats (
            user_id, total_votes, total_matchups, majority_agreement, majority_rate,
            favorite_tool_id, favorite_tool_votes, most_voted_category,
            current_streak, longest_streak, last_voted_at, computed_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT (user_id) DO UPDATE SET
            total_votes = excluded.total_votes,
            total_matchups = excluded.total_matchups,
            majority_agreement = excluded.majority_agreement,
            majority_rate = excluded.majority_rate,
            favorite_tool_id = excluded.favorite_tool_id,
            favorite_tool_votes = excluded.favorite_tool_votes,
            most_voted_category = excluded.most_voted_category,
            current_streak = excluded.current_streak,
            longest_streak = excluded.longest_streak,
            last_voted_at = excluded.last_voted_at,
            computed_at = excluded.computed_at",
        params![
            stats.user_id,
            stats.total_votes,
            stats.total_matchups,
            stats.majority_agreement,
            stats.majority_rate,
            stats.favorite_tool_id,
            stats.favorite_tool_votes,
            stats.most_voted_category,
            stats.current_streak,
            stats.longest_streak,
            stats.last_voted_at,
            stats.computed_at,
        ],
    )?;
    Ok(())
}

/// Users whose stats are missing or out of date:
/// - no stats row yet
/// - a vote newer than `computed_at`
/// - the latest vote's lock time passed after `computed_at`
pub(crate) fn stale_users(conn: &Connection, lock_window_secs: i64, now: i64) -> rusqlite::Result<Vec<UserId>> {
    let mut stmt = conn.prepare(
        "SELECT v.user_id
         FROM votes v
         LEFT JOIN user_vote_stats s ON s.user_id = v.user_id
         GROUP BY v.user_id
         HAVING MAX(s.computed_at) IS NULL
             OR MAX(v.voted_at) > MAX(s.computed_at)
             OR (MAX(v.voted_at) + ?1 > MAX(s.computed_at) AND MAX(v.voted_at) + ?1 <= ?2)
         ORDER BY v.user_id",
    )?;
    let users = stmt
        .query_map(params![lock_window_secs, now], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

pub(crate) fn load(conn: &Connection, user_id: UserId) -> rusqlite::Result<Option<UserVoteStats>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM user_vote_stats WHERE user_id = ?1",
            UserVoteStats::COLUMNS
        ),
        params![user_id],
        UserVoteStats::from_row,
    )
    .optional()
}
