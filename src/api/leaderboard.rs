//! Aggregate read endpoints: leaderboard, teaser, matrix, pair detail
//!
//! All of them read the summary tables only and sit behind the
//! [`LeaderboardCache`](crate::cache::LeaderboardCache).

use super::{internal, parse_category, respond, ApiResponse, CompareApi};
use crate::aggregation::window::TREND_MIN_VOTES;
use crate::cache::CacheKey;
use crate::clock::to_datetime;
use crate::directory::{find_tool_by_slug, ranked_tools, Tool};
use crate::error::{ErrorCode, VoteRejection};
use crate::ledger::has_voted_on_matchup;
use crate::model::{Category, Confidence, H2HStats, ToolId, ToolStats, ToolStatus, UserId};
use rusqlite::{params, Connection};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_MIN_VOTES: i64 = 30;
const TEASER_SIZE: usize = 2;
const PAIR_RECENT_MATCHUPS: i64 = 10;

/// A `tool_stats` row with its tool's display fields
struct RankedRow {
    stats: ToolStats,
    name: String,
    slug: String,
    status: ToolStatus,
}

fn load_category_rows(conn: &Connection, category: Category) -> rusqlite::Result<Vec<RankedRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {}, name, slug, status
         FROM tool_stats JOIN tools USING (tool_id)
         WHERE category = ?1 AND status IN ('active', 'pending')
         ORDER BY tool_id",
        ToolStats::COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![category], |row| {
            Ok(RankedRow {
                stats: ToolStats::from_row(row)?,
                name: row.get(13)?,
                slug: row.get(14)?,
                status: row.get(15)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// tool → {category: win_rate}
fn load_breakdowns(conn: &Connection) -> rusqlite::Result<HashMap<ToolId, Map<String, Value>>> {
    let mut stmt = conn.prepare_cached("SELECT tool_id, category, win_rate FROM tool_stats")?;
    let mut breakdowns: HashMap<ToolId, Map<String, Value>> = HashMap::new();
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, ToolId>(0)?,
            row.get::<_, Category>(1)?,
            row.get::<_, Option<f64>>(2)?,
        ))
    })?;
    for row in rows {
        let (tool_id, category, win_rate) = row?;
        breakdowns
            .entry(tool_id)
            .or_default()
            .insert(category.as_str().to_string(), json!(win_rate));
    }
    Ok(breakdowns)
}

fn pct_display(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

/// Signed week-over-week change, only with enough recent votes
fn trend_delta(stats: &ToolStats) -> Option<String> {
    match (stats.win_rate_7d, stats.win_rate_prev_7d) {
        (Some(current), Some(previous)) if stats.votes_7d >= TREND_MIN_VOTES => {
            Some(format!("{:+.1}%", (current - previous) * 100.0))
        }
        _ => None,
    }
}

fn computed_at(timestamps: impl Iterator<Item = i64>) -> Value {
    json!(timestamps.max().and_then(to_datetime).map(|dt| dt.to_rfc3339()))
}

/// Split into ranked (active, voted on, at or above the threshold) and
/// below-threshold rows. Pending tools always fall below.
fn split_ranked(rows: &[RankedRow], min_votes: i64) -> (Vec<&RankedRow>, Vec<&RankedRow>) {
    let (mut above, below): (Vec<&RankedRow>, Vec<&RankedRow>) = rows.iter().partition(|r| {
        r.status == ToolStatus::Active && r.stats.total_votes > 0 && r.stats.total_votes >= min_votes
    });

    above.sort_by(|x, y| {
        let (wx, wy) = (x.stats.win_rate.unwrap_or(-1.0), y.stats.win_rate.unwrap_or(-1.0));
        wy.partial_cmp(&wx)
            .unwrap_or(Ordering::Equal)
            .then(y.stats.total_votes.cmp(&x.stats.total_votes))
            .then(x.stats.tool_id.cmp(&y.stats.tool_id))
    });
    (above, below)
}

/// Competition ranking ("1, 2, 2, 4") on win rate
fn competition_ranks(above: &[&RankedRow]) -> Vec<usize> {
    let mut ranks = Vec::with_capacity(above.len());
    let mut previous: Option<f64> = None;
    for (i, row) in above.iter().enumerate() {
        let rank = match (previous, ranks.last()) {
            (Some(p), Some(&last)) if row.stats.win_rate == Some(p) => last,
            _ => i + 1,
        };
        ranks.push(rank);
        previous = row.stats.win_rate;
    }
    ranks
}

impl CompareApi {
    /// Ranked tools for one category. `category` defaults to `overall`,
    /// `min_votes` to 30.
    pub fn leaderboard(
        &self,
        viewer: Option<UserId>,
        category: Option<&str>,
        min_votes: Option<i64>,
    ) -> ApiResponse {
        respond(self.leaderboard_inner(viewer, category, min_votes))
    }

    fn leaderboard_inner(
        &self,
        viewer: Option<UserId>,
        category: Option<&str>,
        min_votes: Option<i64>,
    ) -> Result<ApiResponse, VoteRejection> {
        self.require_premium(viewer)?;
        let category = parse_category(category.unwrap_or("overall"))?;
        let min_votes = min_votes.unwrap_or(DEFAULT_MIN_VOTES).max(0);

        let cached = self
            .cache
            .get_or_compute(CacheKey::Leaderboard { category, min_votes }, || {
                self.compute_leaderboard(category, min_votes)
            })?;
        Ok(ApiResponse::cached(cached))
    }

    fn compute_leaderboard(&self, category: Category, min_votes: i64) -> Result<Value, VoteRejection> {
        let conn = self.db.lock().map_err(|e| internal("leaderboard", e))?;
        let rows = load_category_rows(&conn, category).map_err(|e| internal("leaderboard", e.into()))?;
        let mut breakdowns = load_breakdowns(&conn).map_err(|e| internal("leaderboard", e.into()))?;
        drop(conn);

        let (above, below) = split_ranked(&rows, min_votes);
        let ranks = competition_ranks(&above);

        let leaderboard: Vec<Value> = above
            .iter()
            .zip(ranks)
            .map(|(row, rank)| {
                let s = &row.stats;
                json!({
                    "rank": rank,
                    "tool_id": s.tool_id,
                    "tool_name": row.name,
                    "tool_slug": row.slug,
                    "total_votes": s.total_votes,
                    "total_wins": s.total_wins,
                    "win_rate": s.win_rate,
                    "win_rate_display": s.win_rate.map(pct_display),
                    "votes_last_7d": s.votes_7d,
                    "win_rate_7d": s.win_rate_7d,
                    "trend": s.trend,
                    "trend_delta": trend_delta(s),
                    "confidence": Confidence::from_votes(s.total_votes),
                    "category_breakdown": breakdowns.remove(&s.tool_id).unwrap_or_default(),
                })
            })
            .collect();

        let below_threshold: Vec<Value> = below
            .iter()
            .map(|row| {
                let message = match row.status {
                    ToolStatus::Pending => "Pending release".to_string(),
                    _ => format!("{} votes so far", row.stats.total_votes),
                };
                json!({
                    "tool_id": row.stats.tool_id,
                    "tool_name": row.name,
                    "tool_slug": row.slug,
                    "status": row.status,
                    "total_votes": row.stats.total_votes,
                    "message": message,
                })
            })
            .collect();

        Ok(json!({
            "success": true,
            "category": category,
            "min_votes": min_votes,
            "computed_at": computed_at(rows.iter().map(|r| r.stats.computed_at)),
            "leaderboard": leaderboard,
            "below_threshold": below_threshold,
        }))
    }

    /// Top two overall tools with a rounded (nearest 5%) win rate
    pub fn teaser(&self) -> ApiResponse {
        respond(
            self.cache
                .get_or_compute(CacheKey::Teaser, || {
                    let conn = self.db.lock().map_err(|e| internal("teaser", e))?;
                    let rows = load_category_rows(&conn, Category::Overall)
                        .map_err(|e| internal("teaser", e.into()))?;
                    drop(conn);

                    let (above, _) = split_ranked(&rows, 0);
                    let tools: Vec<Value> = above
                        .iter()
                        .take(TEASER_SIZE)
                        .map(|row| {
                            let rounded = row.stats.win_rate.map(|wr| (wr * 20.0).round() as i64 * 5);
                            json!({
                                "tool_name": row.name,
                                "tool_slug": row.slug,
                                "win_rate_rounded": rounded,
                            })
                        })
                        .collect();

                    Ok(json!({ "success": true, "tools": tools }))
                })
                .map(ApiResponse::cached),
        )
    }

    /// Every head-to-head cell of one category
    pub fn matrix(&self, viewer: Option<UserId>, category: Option<&str>) -> ApiResponse {
        respond(self.matrix_inner(viewer, category))
    }

    fn matrix_inner(
        &self,
        viewer: Option<UserId>,
        category: Option<&str>,
    ) -> Result<ApiResponse, VoteRejection> {
        self.require_premium(viewer)?;
        let category = parse_category(category.unwrap_or("overall"))?;

        let cached = self.cache.get_or_compute(CacheKey::Matrix(category), || {
            let conn = self.db.lock().map_err(|e| internal("matrix", e))?;
            let tools = ranked_tools(&conn).map_err(|e| internal("matrix", e.into()))?;
            let cells = load_h2h(&conn, "category = ?1", params![category])
                .map_err(|e| internal("matrix", e.into()))?;
            drop(conn);

            let pending: HashSet<ToolId> = tools
                .iter()
                .filter(|t| t.status == ToolStatus::Pending)
                .map(|t| t.tool_id)
                .collect();
            let cell_values: Vec<Value> = cells
                .iter()
                .map(|h| {
                    json!({
                        "tool_a": h.tool_a,
                        "tool_b": h.tool_b,
                        "total_votes": h.total_votes,
                        "tool_a_wins": h.tool_a_wins,
                        "tool_b_wins": h.tool_b_wins,
                        "tool_a_win_rate": h.tool_a_win_rate,
                        "tool_b_win_rate": h.tool_b_win_rate,
                        "confidence": h.confidence,
                        "pending": pending.contains(&h.tool_a) || pending.contains(&h.tool_b),
                    })
                })
                .collect();

            Ok(json!({
                "success": true,
                "category": category,
                "tools": tools,
                "cells": cell_values,
                "computed_at": computed_at(cells.iter().map(|h| h.computed_at)),
            }))
        })?;
        Ok(ApiResponse::cached(cached))
    }

    /// Head-to-head detail for two tools given by slug, in either order.
    ///
    /// The shared part is cached per canonical pair; `user_has_voted` flags
    /// are added for the viewer after the cache read.
    pub fn pair_detail(&self, viewer: Option<UserId>, slug_x: &str, slug_y: &str) -> ApiResponse {
        respond(self.pair_detail_inner(viewer, slug_x, slug_y))
    }

    fn pair_detail_inner(
        &self,
        viewer: Option<UserId>,
        slug_x: &str,
        slug_y: &str,
    ) -> Result<ApiResponse, VoteRejection> {
        let user_id = self.require_premium(viewer)?;
        let (x, y) = {
            let conn = self.db.lock().map_err(|e| internal("pair detail", e))?;
            let lookup = |slug: &str| -> Result<Tool, VoteRejection> {
                find_tool_by_slug(&conn, slug)
                    .map_err(|e| internal("pair detail", e.into()))?
                    .ok_or_else(|| {
                        VoteRejection::new(ErrorCode::ToolNotFound, format!("Unknown tool '{}'", slug))
                            .with_details(json!({ "slug": slug }))
                    })
            };
            (lookup(slug_x)?, lookup(slug_y)?)
        };

        if x.tool_id == y.tool_id {
            return Err(VoteRejection::new(
                ErrorCode::SameTool,
                "Pick two different tools to compare",
            )
            .with_details(json!({ "slug": x.slug })));
        }
        let (a, b) = if x.tool_id < y.tool_id { (x, y) } else { (y, x) };

        let mut cached = self
            .cache
            .get_or_compute(CacheKey::H2hPair(a.tool_id, b.tool_id), || {
                self.compute_pair_detail(&a, &b)
            })?;

        if let Some(recent) = cached.value["recent_matchups"].as_array_mut() {
            let conn = self.db.lock().map_err(|e| internal("pair detail", e))?;
            for entry in recent.iter_mut() {
                let matchup_id = entry["matchup_id"].as_i64().unwrap_or_default();
                let voted = has_voted_on_matchup(&conn, user_id, matchup_id)
                    .map_err(|e| internal("pair detail", e.into()))?;
                entry["user_has_voted"] = json!(voted);
            }
        }

        Ok(ApiResponse::cached(cached))
    }

    fn compute_pair_detail(&self, a: &Tool, b: &Tool) -> Result<Value, VoteRejection> {
        let rows = {
            let conn = self.db.lock().map_err(|e| internal("pair detail", e))?;
            load_h2h(&conn, "tool_a = ?1 AND tool_b = ?2", params![a.tool_id, b.tool_id])
                .map_err(|e| internal("pair detail", e.into()))?
        };

        let categories: Map<String, Value> = rows
            .iter()
            .map(|h| {
                (
                    h.category.as_str().to_string(),
                    json!({
                        "total_votes": h.total_votes,
                        "tool_a_wins": h.tool_a_wins,
                        "tool_b_wins": h.tool_b_wins,
                        "tool_a_win_rate": h.tool_a_win_rate,
                        "tool_b_win_rate": h.tool_b_win_rate,
                        "votes_7d": h.votes_7d,
                        "tool_a_trend": h.tool_a_trend,
                        "tool_b_trend": h.tool_b_trend,
                        "confidence": h.confidence,
                    }),
                )
            })
            .collect();

        let (recent, total) = self
            .registry
            .matchups_for_tools(a.tool_id, b.tool_id, PAIR_RECENT_MATCHUPS)
            .map_err(|e| internal("pair detail", e))?;
        let recent: Vec<Value> = recent
            .iter()
            .map(|view| {
                json!({
                    "matchup_id": view.matchup.matchup_id,
                    "title_a": view.title_a,
                    "title_b": view.title_b,
                    "created_at": to_datetime(view.matchup.created_at).map(|dt| dt.to_rfc3339()),
                })
            })
            .collect();

        Ok(json!({
            "success": true,
            "tool_a": a,
            "tool_b": b,
            "categories": categories,
            "recent_matchups": recent,
            "total_matchups": total,
            "computed_at": computed_at(rows.iter().map(|h| h.computed_at)),
        }))
    }
}

fn load_h2h(
    conn: &Connection,
    filter: &str,
    args: impl rusqlite::Params,
) -> rusqlite::Result<Vec<H2HStats>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM h2h_stats WHERE {} ORDER BY tool_a, tool_b, category",
        H2HStats::COLUMNS,
        filter
    ))?;
    let rows = stmt
        .query_map(args, H2HStats::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
