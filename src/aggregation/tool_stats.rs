//! Per-(tool, category) win rates

use super::window::{Bucket, Windowed};
use crate::directory::ranked_tools;
use crate::model::{Category, ToolId};
use rusqlite::{params, Connection};
use std::collections::HashMap;

/// Grouped locked votes from active matchups
#[derive(Debug, Clone, Copy)]
pub(crate) struct VoteGroup {
    pub tool_a: ToolId,
    pub tool_b: ToolId,
    pub category: Category,
    pub winner_tool: ToolId,
    pub bucket: Bucket,
    pub votes: i64,
}

/// Load locked votes from active matchups, grouped by pair, category,
/// winner and window. Shared by the tool and head-to-head rebuilds.
pub(crate) fn load_vote_groups(conn: &Connection, now: i64) -> rusqlite::Result<Vec<VoteGroup>> {
    let week = super::window::WEEK_SECS;
    let mut stmt = conn.prepare(
        "SELECT m.tool_a, m.tool_b, v.category, v.winner_tool,
                CASE WHEN v.voted_at >= ?1 THEN 0
                     WHEN v.voted_at >= ?2 THEN 1
                     ELSE 2 END AS bucket,
                COUNT(*)
         FROM votes v
         JOIN matchups m ON m.matchup_id = v.matchup_id
         WHERE v.locked = 1 AND m.status = 'active'
         GROUP BY m.tool_a, m.tool_b, v.category, v.winner_tool, bucket",
    )?;
    let groups = stmt
        .query_map(params![now - week, now - 2 * week], |row| {
            Ok(VoteGroup {
                tool_a: row.get(0)?,
                tool_b: row.get(1)?,
                category: row.get(2)?,
                winner_tool: row.get(3)?,
                bucket: match row.get::<_, i64>(4)? {
                    0 => Bucket::Last7d,
                    1 => Bucket::Prev7d,
                    _ => Bucket::Older,
                },
                votes: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(groups)
}

/// Fold vote groups into per-(tool, category) windows. Each vote counts
/// once for both participating tools.
pub(crate) fn tally_by_tool(groups: &[VoteGroup]) -> HashMap<(ToolId, Category), Windowed> {
    let mut tallies: HashMap<(ToolId, Category), Windowed> = HashMap::new();
    for g in groups {
        for tool in [g.tool_a, g.tool_b] {
            tallies
                .entry((tool, g.category))
                .or_default()
                .add(g.bucket, g.votes, g.winner_tool == tool);
        }
    }
    tallies
}

/// Rebuild `tool_stats` inside the caller's transaction.
/// Returns (tools, rows written).
pub(crate) fn rebuild(conn: &Connection, now: i64) -> rusqlite::Result<(usize, usize)> {
    let tools = ranked_tools(conn)?;
    let tallies = tally_by_tool(&load_vote_groups(conn, now)?);

    let mut upsert = conn.prepare(
        "INSERT INTO tool_stats (
            tool_id, category, total_votes, total_wins, win_rate,
            votes_7d, wins_7d, win_rate_7d,
            votes_prev_7d, wins_prev_7d, win_rate_prev_7d,
            trend, computed_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
         ON CONFLICT (tool_id, category) DO UPDATE SET
            total_votes = excluded.total_votes,
            total_wins = excluded.total_wins,
            win_rate = excluded.win_rate,
            votes_7d = excluded.votes_7d,
            wins_7d = excluded.wins_7d,
            win_rate_7d = excluded.win_rate_7d,
            votes_prev_7d = excluded.votes_prev_7d,
            wins_prev_7d = excluded.wins_prev_7d,
            win_rate_prev_7d = excluded.win_rate_prev_7d,
            trend = excluded.trend,
            computed_at = excluded.computed_at",
    )?;

    let mut rows = 0;
    for tool in &tools {
        for category in Category::ALL {
            let w = tallies
                .get(&(tool.tool_id, category))
                .copied()
                .unwrap_or_default();
            upsert.execute(params![
                tool.tool_id,
                category,
                w.total.votes,
                w.total.wins,
                w.total.rate(),
                w.last_7d.votes,
                w.last_7d.wins,
                w.last_7d.rate(),
                w.prev_7d.votes,
                w.prev_7d.wins,
                w.prev_7d.rate(),
                w.trend(),
                now,
            ])?;
            rows += 1;
        }
    }

    // Tools that dropped out of the ranked set
    conn.execute("DELETE FROM tool_stats WHERE computed_at < ?1", params![now])?;

    Ok((tools.len(), rows))
}
