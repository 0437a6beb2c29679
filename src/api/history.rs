//! Per-user endpoints: vote stats profile and filtered vote history

use super::{internal, parse_category, respond, ApiResponse, CompareApi};
use crate::clock::to_datetime;
use crate::error::{ErrorCode, VoteRejection};
use crate::model::{Category, UserId, UserVoteStats};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::{json, Map, Value};

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 50;

/// History filters as they arrive from the query string
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// Tool slug on either side of the matchup
    pub tool: Option<String>,
    pub category: Option<String>,
    /// `majority` | `minority`
    pub alignment: Option<String>,
    /// `newest` (default) | `oldest`
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Alignment {
    Majority,
    Minority,
}

impl Alignment {
    fn as_str(self) -> &'static str {
        match self {
            Alignment::Majority => "majority",
            Alignment::Minority => "minority",
        }
    }
}

/// Validated filters
struct HistoryFilter {
    page: i64,
    limit: i64,
    tool: Option<String>,
    category: Option<Category>,
    alignment: Option<Alignment>,
    oldest_first: bool,
}

impl HistoryFilter {
    fn parse(query: &HistoryQuery) -> Result<Self, VoteRejection> {
        let category = query.category.as_deref().map(parse_category).transpose()?;

        let alignment = match query.alignment.as_deref() {
            None => None,
            Some("majority") => Some(Alignment::Majority),
            Some("minority") => Some(Alignment::Minority),
            Some(other) => {
                return Err(VoteRejection::new(
                    ErrorCode::InvalidAlignment,
                    "Alignment must be 'majority' or 'minority'",
                )
                .with_details(json!({ "alignment": other })))
            }
        };

        let oldest_first = match query.sort.as_deref() {
            None | Some("newest") => false,
            Some("oldest") => true,
            Some(other) => {
                return Err(VoteRejection::new(
                    ErrorCode::InvalidSort,
                    "Sort must be 'newest' or 'oldest'",
                )
                .with_details(json!({ "sort": other })))
            }
        };

        Ok(Self {
            page: query.page.unwrap_or(1).max(1),
            limit: query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            tool: query.tool.clone(),
            category,
            alignment,
            oldest_first,
        })
    }
}

// Community majority over locked votes, ties to the lower tool id. ?1..?4 are
// user, tool slug, category, alignment.
const HISTORY_FROM: &str = "
    WITH counts AS (
        SELECT matchup_id, category, winner_tool, COUNT(*) AS n
        FROM votes WHERE locked = 1
        GROUP BY matchup_id, category, winner_tool
    ), majority AS (
        SELECT matchup_id, category, winner_tool,
               ROW_NUMBER() OVER (
                   PARTITION BY matchup_id, category
                   ORDER BY n DESC, winner_tool ASC
               ) AS rn
        FROM counts
    )
    SELECT {select}
    FROM votes v
    JOIN matchups m ON m.matchup_id = v.matchup_id
    JOIN tools ta ON ta.tool_id = m.tool_a
    JOIN tools tb ON tb.tool_id = m.tool_b
    JOIN tools w ON w.tool_id = v.winner_tool
    LEFT JOIN majority r
      ON r.matchup_id = v.matchup_id AND r.category = v.category AND r.rn = 1
    WHERE v.user_id = ?1
      AND (?2 IS NULL OR ta.slug = ?2 OR tb.slug = ?2)
      AND (?3 IS NULL OR v.category = ?3)
      AND (?4 IS NULL
           OR (?4 = 'majority' AND v.locked = 1 AND r.winner_tool = v.winner_tool)
           OR (?4 = 'minority' AND v.locked = 1 AND r.winner_tool <> v.winner_tool))";

const HISTORY_COLUMNS: &str = "v.vote_id, v.matchup_id, v.category, v.voted_at, v.locked,
    w.tool_id, w.name, w.slug, ta.tool_id, ta.name, ta.slug, tb.tool_id, tb.name, tb.slug,
    r.winner_tool";

fn tool_json(id: i64, name: String, slug: String) -> Value {
    json!({ "tool_id": id, "name": name, "slug": slug })
}

fn history_page(conn: &Connection, user_id: UserId, f: &HistoryFilter) -> rusqlite::Result<(Vec<Value>, i64)> {
    let alignment = f.alignment.map(Alignment::as_str);

    let total: i64 = conn.query_row(
        &HISTORY_FROM.replace("{select}", "COUNT(*)"),
        params![user_id, f.tool, f.category, alignment],
        |row| row.get(0),
    )?;

    let order = if f.oldest_first { "ASC" } else { "DESC" };
    let sql = format!(
        "{} ORDER BY v.voted_at {order}, v.vote_id {order} LIMIT ?5 OFFSET ?6",
        HISTORY_FROM.replace("{select}", HISTORY_COLUMNS),
        order = order
    );
    let mut stmt = conn.prepare(&sql)?;
    let votes = stmt
        .query_map(
            params![user_id, f.tool, f.category, alignment, f.limit, (f.page - 1).saturating_mul(f.limit)],
            |row| {
                let winner: i64 = row.get(5)?;
                let locked: bool = row.get(4)?;
                let majority: Option<i64> = row.get(14)?;
                let aligned = match (locked, majority) {
                    (true, Some(m)) => Some(m == winner),
                    _ => None,
                };
                Ok(json!({
                    "vote_id": row.get::<_, i64>(0)?,
                    "matchup_id": row.get::<_, i64>(1)?,
                    "category": row.get::<_, Category>(2)?,
                    "voted_at": to_datetime(row.get(3)?),
                    "locked": locked,
                    "winner": tool_json(winner, row.get(6)?, row.get(7)?),
                    "tool_a": tool_json(row.get(8)?, row.get(9)?, row.get(10)?),
                    "tool_b": tool_json(row.get(11)?, row.get(12)?, row.get(13)?),
                    "user_aligned": aligned,
                }))
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok((votes, total))
}

/// Live distributions: votes per category and wins given per tool
fn distributions(conn: &Connection, user_id: UserId) -> rusqlite::Result<(Value, Value)> {
    let mut stmt = conn.prepare_cached(
        "SELECT category, COUNT(*) FROM votes WHERE user_id = ?1 GROUP BY category ORDER BY category",
    )?;
    let by_category = stmt
        .query_map(params![user_id], |row| {
            Ok((row.get::<_, Category>(0)?, row.get::<_, i64>(1)?))
        })?
        .map(|r| r.map(|(c, n)| (c.as_str().to_string(), json!(n))))
        .collect::<rusqlite::Result<Map<String, Value>>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT t.tool_id, t.name, t.slug, COUNT(*) AS n
         FROM votes v JOIN tools t ON t.tool_id = v.winner_tool
         WHERE v.user_id = ?1
         GROUP BY t.tool_id ORDER BY n DESC, t.tool_id",
    )?;
    let by_tool = stmt
        .query_map(params![user_id], |row| {
            Ok(json!({
                "tool_id": row.get::<_, i64>(0)?,
                "tool_name": row.get::<_, String>(1)?,
                "tool_slug": row.get::<_, String>(2)?,
                "votes": row.get::<_, i64>(3)?,
            }))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok((Value::Object(by_category), Value::Array(by_tool)))
}

fn favorite_tool(conn: &Connection, stats: &UserVoteStats) -> rusqlite::Result<Value> {
    let Some(tool_id) = stats.favorite_tool_id else {
        return Ok(Value::Null);
    };
    let tool = conn
        .query_row(
            "SELECT name, slug FROM tools WHERE tool_id = ?1",
            params![tool_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;
    Ok(match tool {
        Some((name, slug)) => json!({
            "tool_id": tool_id,
            "tool_name": name,
            "tool_slug": slug,
            "votes": stats.favorite_tool_votes,
        }),
        None => Value::Null,
    })
}

impl CompareApi {
    /// The viewer's voting profile. Stats are computed on first access if
    /// the recompute job has not reached this user yet.
    pub fn user_vote_stats(&self, viewer: Option<UserId>) -> ApiResponse {
        respond(self.user_vote_stats_inner(viewer))
    }

    fn user_vote_stats_inner(&self, viewer: Option<UserId>) -> Result<ApiResponse, VoteRejection> {
        let user_id = self.require_premium(viewer)?;

        let stored = self
            .engine
            .user_stats(user_id)
            .map_err(|e| internal("user stats", e))?;
        let stats = match stored {
            Some(stats) => stats,
            None => self
                .engine
                .recompute_user_stats(user_id)
                .map_err(|e| internal("user stats", e))?,
        };
        if stats.total_votes == 0 {
            return Ok(ApiResponse::ok(json!({ "success": true, "empty": true })));
        }

        let conn = self.db.lock().map_err(|e| internal("user stats", e))?;
        let favorite = favorite_tool(&conn, &stats).map_err(|e| internal("user stats", e.into()))?;
        let (category_distribution, tool_distribution) =
            distributions(&conn, user_id).map_err(|e| internal("user stats", e.into()))?;
        drop(conn);

        Ok(ApiResponse::ok(json!({
            "success": true,
            "empty": false,
            "stats": {
                "total_votes": stats.total_votes,
                "total_matchups": stats.total_matchups,
                "majority_agreement": stats.majority_agreement,
                "majority_rate": stats.majority_rate,
                "favorite_tool": favorite,
                "most_voted_category": stats.most_voted_category,
                "current_streak": stats.current_streak,
                "longest_streak": stats.longest_streak,
                "last_voted_at": stats.last_voted_at.and_then(to_datetime),
                "computed_at": to_datetime(stats.computed_at),
            },
            "category_distribution": category_distribution,
            "tool_distribution": tool_distribution,
        })))
    }

    /// The viewer's votes, newest first by default
    pub fn vote_history(&self, viewer: Option<UserId>, query: &HistoryQuery) -> ApiResponse {
        respond(self.vote_history_inner(viewer, query))
    }

    fn vote_history_inner(
        &self,
        viewer: Option<UserId>,
        query: &HistoryQuery,
    ) -> Result<ApiResponse, VoteRejection> {
        let user_id = self.require_premium(viewer)?;
        let filter = HistoryFilter::parse(query)?;

        let (votes, total) = {
            let conn = self.db.lock().map_err(|e| internal("vote history", e))?;
            history_page(&conn, user_id, &filter).map_err(|e| internal("vote history", e.into()))?
        };

        Ok(ApiResponse::ok(json!({
            "success": true,
            "votes": votes,
            "total": total,
            "page": filter.page,
            "limit": filter.limit,
            "pages": (total + filter.limit - 1) / filter.limit,
        })))
    }
}
