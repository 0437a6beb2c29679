//! Head-to-head stats: one row per unordered tool pair per category,
//! including pairs that have never met.

use super::tool_stats::{load_vote_groups, VoteGroup};
use super::window::Windowed;
use crate::directory::ranked_tools;
use crate::model::{Category, Confidence, ToolId, ToolStatus, Trend};
use rusqlite::{params, Connection};
use std::collections::HashMap;

/// Windows from side A's point of view, keyed by (tool_a, tool_b, category)
fn tally_by_pair(groups: &[VoteGroup]) -> HashMap<(ToolId, ToolId, Category), Windowed> {
    let mut tallies: HashMap<(ToolId, ToolId, Category), Windowed> = HashMap::new();
    for g in groups {
        tallies
            .entry((g.tool_a, g.tool_b, g.category))
            .or_default()
            .add(g.bucket, g.votes, g.winner_tool == g.tool_a);
    }
    tallies
}

/// Per-side trends; pending pairs are `new` on both sides
pub(crate) fn pair_trends(a_side: &Windowed, pending: bool) -> (Trend, Trend) {
    if pending {
        return (Trend::New, Trend::New);
    }
    let a = a_side.trend();
    (a, a.mirror())
}

/// Rebuild `h2h_stats` inside the caller's transaction.
/// Returns (pairs, rows written).
pub(crate) fn rebuild(conn: &Connection, now: i64) -> rusqlite::Result<(usize, usize)> {
    let tools = ranked_tools(conn)?;
    let tallies = tally_by_pair(&load_vote_groups(conn, now)?);

    let mut upsert = conn.prepare(
        "INSERT INTO h2h_stats (
            tool_a, tool_b, category, total_votes, tool_a_wins, tool_b_wins,
            tool_a_win_rate, tool_b_win_rate,
            votes_7d, tool_a_wins_7d, votes_prev_7d, tool_a_wins_prev_7d,
            confidence, tool_a_trend, tool_b_trend, computed_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
         ON CONFLICT (tool_a, tool_b, category) DO UPDATE SET
            total_votes = excluded.total_votes,
            tool_a_wins = excluded.tool_a_wins,
            tool_b_wins = excluded.tool_b_wins,
            tool_a_win_rate = excluded.tool_a_win_rate,
            tool_b_win_rate = excluded.tool_b_win_rate,
            votes_7d = excluded.votes_7d,
            tool_a_wins_7d = excluded.tool_a_wins_7d,
            votes_prev_7d = excluded.votes_prev_7d,
            tool_a_wins_prev_7d = excluded.tool_a_wins_prev_7d,
            confidence = excluded.confidence,
            tool_a_trend = excluded.tool_a_trend,
            tool_b_trend = excluded.tool_b_trend,
            computed_at = excluded.computed_at",
    )?;

    let mut pairs = 0;
    let mut rows = 0;
    // ranked_tools is ordered by id, so (a, b) is already canonical
    for (i, a) in tools.iter().enumerate() {
        for b in &tools[i + 1..] {
            pairs += 1;
            let pending = a.status == ToolStatus::Pending || b.status == ToolStatus::Pending;

            for category in Category::ALL {
                let w = tallies
                    .get(&(a.tool_id, b.tool_id, category))
                    .copied()
                    .unwrap_or_default();
                let total = w.total.votes;
                let a_wins = w.total.wins;
                let b_wins = total - a_wins;
                let (a_rate, b_rate) = if total > 0 {
                    (
                        Some(a_wins as f64 / total as f64),
                        Some(b_wins as f64 / total as f64),
                    )
                } else {
                    (None, None)
                };
                let (a_trend, b_trend) = pair_trends(&w, pending);

                upsert.execute(params![
                    a.tool_id,
                    b.tool_id,
                    category,
                    total,
                    a_wins,
                    b_wins,
                    a_rate,
                    b_rate,
                    w.last_7d.votes,
                    w.last_7d.wins,
                    w.prev_7d.votes,
                    w.prev_7d.wins,
                    Confidence::from_votes(total),
                    a_trend,
                    b_trend,
                    now,
                ])?;
                rows += 1;
            }
        }
    }

    conn.execute("DELETE FROM h2h_stats WHERE computed_at < ?1", params![now])?;

    Ok((pairs, rows))
}

#[cfg(test)]
mod tests {
    use super::super::window::{Bucket, Tally};
    use super::*;

    #[test]
    fn test_pending_forces_new() {
        let mut w = Windowed::default();
        w.add(Bucket::Last7d, 10, true);
        w.add(Bucket::Prev7d, 10, false);

        assert_eq!(pair_trends(&w, true), (Trend::New, Trend::New));
        assert_eq!(pair_trends(&w, false), (Trend::Up, Trend::Down));
    }

    #[test]
    fn test_thin_windows_stable_both_sides() {
        let w = Windowed {
            total: Tally { votes: 8, wins: 8 },
            last_7d: Tally { votes: 4, wins: 4 },
            prev_7d: Tally { votes: 4, wins: 0 },
        };
        assert_eq!(pair_trends(&w, false), (Trend::Stable, Trend::Stable));
    }
}
