//! Matchup Registry
//!
//! Creates blind pairings of two posts from two different active tools and
//! looks them up. Stored matchups are always in canonical order (side A is
//! the lower tool id); uniqueness of the unordered post pair is enforced by
//! the `idx_matchups_post_pair` expression index, so concurrent creators
//! cannot race a duplicate in.

use crate::clock::Clock;
use crate::db::Database;
use crate::directory::post_with_tool;
use crate::error::{MatchupError, StoreError};
use crate::model::{Matchup, MatchupId, MatchupStatus, MatchupView, PostId, ToolId, ToolStatus, UserId};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

/// Left/right placement for one viewer: side A is on the left when
/// `(seed + user) % 2 == 0`. Stable per (matchup, user) and independent of
/// vote content.
pub fn position_a_is_left(position_seed: i64, user_id: UserId) -> bool {
    (position_seed + user_id).rem_euclid(2) == 0
}

const VIEW_SELECT: &str = "SELECT m.matchup_id, m.post_a_id, m.post_b_id, m.tool_a, m.tool_b,
        m.prompt_id, m.position_seed, m.status, m.is_pinned, m.created_at,
        ta.name, ta.slug, tb.name, tb.slug, pa.title, pb.title
     FROM matchups m
     JOIN tools ta ON ta.tool_id = m.tool_a
     JOIN tools tb ON tb.tool_id = m.tool_b
     JOIN posts pa ON pa.post_id = m.post_a_id
     JOIN posts pb ON pb.post_id = m.post_b_id";

fn view_from_row(row: &Row<'_>) -> rusqlite::Result<MatchupView> {
    Ok(MatchupView {
        matchup: Matchup::from_row(row)?,
        tool_a_name: row.get(10)?,
        tool_a_slug: row.get(11)?,
        tool_b_name: row.get(12)?,
        tool_b_slug: row.get(13)?,
        title_a: row.get(14)?,
        title_b: row.get(15)?,
    })
}

/// An active matchup seen from one of its posts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostMatchup {
    pub matchup_id: MatchupId,
    pub opposing_post_id: PostId,
    pub opposing_tool_id: ToolId,
    pub opposing_tool_name: String,
    pub opposing_tool_slug: String,
}

/// One page of active matchups
#[derive(Debug, Clone, Serialize)]
pub struct MatchupPage {
    pub matchups: Vec<MatchupView>,
    pub total: i64,
    pub page: i64,
    pub pages: i64,
}

pub struct MatchupRegistry {
    db: Database,
    clock: Clock,
}

impl MatchupRegistry {
    pub fn new(db: Database, clock: Clock) -> Self {
        Self { db, clock }
    }

    /// Create a matchup for two posts, in either order.
    ///
    /// Returns `Ok(None)` when a matchup for this unordered post pair already
    /// exists; creation is idempotent.
    pub fn create_matchup(
        &self,
        post_x: PostId,
        post_y: PostId,
        prompt_id: Option<i64>,
    ) -> Result<Option<MatchupId>, MatchupError> {
        if post_x == post_y {
            return Err(MatchupError::InvalidPair);
        }

        let conn = self.db.lock()?;

        let x = post_with_tool(&conn, post_x)?.ok_or(MatchupError::PostNotFound(post_x))?;
        let y = post_with_tool(&conn, post_y)?.ok_or(MatchupError::PostNotFound(post_y))?;

        if x.tool_id == y.tool_id {
            return Err(MatchupError::SameTool(x.tool_id));
        }
        for owner in [&x, &y] {
            if owner.tool_status != ToolStatus::Active {
                return Err(MatchupError::ToolInactive {
                    tool_id: owner.tool_id,
                    status: owner.tool_status.to_string(),
                });
            }
        }

        let (a, b) = if x.tool_id < y.tool_id { (x, y) } else { (y, x) };
        let seed: i64 = rand::thread_rng().gen_range(0..(1_i64 << 31));

        let inserted = conn.execute(
            "INSERT INTO matchups
                (post_a_id, post_b_id, tool_a, tool_b, prompt_id, position_seed, status, is_pinned, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', 0, ?7)
             ON CONFLICT DO NOTHING",
            params![a.post_id, b.post_id, a.tool_id, b.tool_id, prompt_id, seed, (self.clock)()],
        )?;

        if inserted == 0 {
            log::debug!("Matchup for posts {}/{} already exists", post_x, post_y);
            return Ok(None);
        }

        let matchup_id = conn.last_insert_rowid();
        log::info!(
            "🆚 Created matchup {} (posts {} vs {}, tools {} vs {})",
            matchup_id,
            a.post_id,
            b.post_id,
            a.tool_id,
            b.tool_id
        );
        Ok(Some(matchup_id))
    }

    pub fn get_matchup(&self, matchup_id: MatchupId) -> Result<Option<Matchup>, StoreError> {
        let conn = self.db.lock()?;
        Ok(load_matchup(&conn, matchup_id)?)
    }

    /// Matchup with tool names and post titles
    pub fn get_matchup_view(&self, matchup_id: MatchupId) -> Result<Option<MatchupView>, StoreError> {
        let conn = self.db.lock()?;
        let view = conn
            .query_row(
                &format!("{} WHERE m.matchup_id = ?1", VIEW_SELECT),
                params![matchup_id],
                view_from_row,
            )
            .optional()?;
        Ok(view)
    }

    /// Order-independent lookup by post pair
    pub fn get_matchup_by_posts(
        &self,
        post_x: PostId,
        post_y: PostId,
    ) -> Result<Option<Matchup>, StoreError> {
        let conn = self.db.lock()?;
        let matchup = conn
            .query_row(
                &format!(
                    "SELECT {} FROM matchups
                     WHERE min(post_a_id, post_b_id) = min(?1, ?2)
                       AND max(post_a_id, post_b_id) = max(?1, ?2)",
                    Matchup::COLUMNS
                ),
                params![post_x, post_y],
                Matchup::from_row,
            )
            .optional()?;
        Ok(matchup)
    }

    /// Insert every missing matchup between posts of two different active
    /// tools, in one statement. Returns the number of matchups created.
    pub fn backfill_matchups(&self) -> Result<usize, StoreError> {
        let conn = self.db.lock()?;
        let created = conn.execute(
            "INSERT INTO matchups
                (post_a_id, post_b_id, tool_a, tool_b, prompt_id, position_seed, status, is_pinned, created_at)
             SELECT pa.post_id, pb.post_id, pa.tool_id, pb.tool_id, NULL,
                    abs(random() % 2147483648), 'active', 0, ?1
             FROM posts pa
             JOIN tools ta ON ta.tool_id = pa.tool_id AND ta.status = 'active'
             JOIN posts pb ON pb.tool_id > pa.tool_id
             JOIN tools tb ON tb.tool_id = pb.tool_id AND tb.status = 'active'
             WHERE NOT EXISTS (
                 SELECT 1 FROM matchups m
                 WHERE min(m.post_a_id, m.post_b_id) = min(pa.post_id, pb.post_id)
                   AND max(m.post_a_id, m.post_b_id) = max(pa.post_id, pb.post_id)
             )
             ON CONFLICT DO NOTHING",
            params![(self.clock)()],
        )?;

        log::info!("🆚 Backfill created {} matchups", created);
        Ok(created)
    }

    pub fn set_status(&self, matchup_id: MatchupId, status: MatchupStatus) -> Result<bool, StoreError> {
        let conn = self.db.lock()?;
        let n = conn.execute(
            "UPDATE matchups SET status = ?1 WHERE matchup_id = ?2",
            params![status, matchup_id],
        )?;
        Ok(n > 0)
    }

    pub fn archive(&self, matchup_id: MatchupId) -> Result<bool, StoreError> {
        self.set_status(matchup_id, MatchupStatus::Archived)
    }

    pub fn set_pinned(&self, matchup_id: MatchupId, pinned: bool) -> Result<bool, StoreError> {
        let conn = self.db.lock()?;
        let n = conn.execute(
            "UPDATE matchups SET is_pinned = ?1 WHERE matchup_id = ?2",
            params![pinned, matchup_id],
        )?;
        Ok(n > 0)
    }

    /// Active matchups, pinned first then newest. `page` is 1-based.
    pub fn get_active_matchups(&self, page: i64, per_page: i64) -> Result<MatchupPage, StoreError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let conn = self.db.lock()?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM matchups WHERE status = 'active'",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE m.status = 'active'
             ORDER BY m.is_pinned DESC, m.created_at DESC, m.matchup_id DESC
             LIMIT ?1 OFFSET ?2",
            VIEW_SELECT
        ))?;
        let matchups = stmt
            .query_map(params![per_page, (page - 1).saturating_mul(per_page)], view_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(MatchupPage {
            matchups,
            total,
            page,
            pages: (total + per_page - 1) / per_page,
        })
    }

    /// Active matchups that include `post_id`, with the opposing side's tool
    pub fn get_active_matchups_for_post(&self, post_id: PostId) -> Result<Vec<PostMatchup>, StoreError> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT m.matchup_id,
                    CASE WHEN m.post_a_id = ?1 THEN m.post_b_id ELSE m.post_a_id END AS other_post,
                    t.tool_id, t.name, t.slug
             FROM matchups m
             JOIN tools t
               ON t.tool_id = CASE WHEN m.post_a_id = ?1 THEN m.tool_b ELSE m.tool_a END
             WHERE (m.post_a_id = ?1 OR m.post_b_id = ?1) AND m.status = 'active'
             ORDER BY m.created_at DESC, m.matchup_id DESC",
        )?;
        let rows = stmt
            .query_map(params![post_id], |row| {
                Ok(PostMatchup {
                    matchup_id: row.get(0)?,
                    opposing_post_id: row.get(1)?,
                    opposing_tool_id: row.get(2)?,
                    opposing_tool_name: row.get(3)?,
                    opposing_tool_slug: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Featured pick: newest pinned active matchup, else the active matchup
    /// with the most votes in the last 7 days, else the newest active one.
    pub fn featured_matchup(&self) -> Result<Option<MatchupView>, StoreError> {
        let since = (self.clock)() - 7 * 86_400;
        let conn = self.db.lock()?;

        let pinned = conn
            .query_row(
                &format!(
                    "{} WHERE m.status = 'active' AND m.is_pinned = 1
                     ORDER BY m.created_at DESC, m.matchup_id DESC LIMIT 1",
                    VIEW_SELECT
                ),
                [],
                view_from_row,
            )
            .optional()?;
        if pinned.is_some() {
            return Ok(pinned);
        }

        let popular = conn
            .query_row(
                &format!(
                    "{} JOIN (
                         SELECT matchup_id, COUNT(*) AS n FROM votes
                         WHERE voted_at >= ?1 GROUP BY matchup_id
                     ) v ON v.matchup_id = m.matchup_id
                     WHERE m.status = 'active'
                     ORDER BY v.n DESC, m.created_at DESC LIMIT 1",
                    VIEW_SELECT
                ),
                params![since],
                view_from_row,
            )
            .optional()?;
        if popular.is_some() {
            return Ok(popular);
        }

        let newest = conn
            .query_row(
                &format!(
                    "{} WHERE m.status = 'active'
                     ORDER BY m.created_at DESC, m.matchup_id DESC LIMIT 1",
                    VIEW_SELECT
                ),
                [],
                view_from_row,
            )
            .optional()?;
        Ok(newest)
    }

    /// Most recent active matchups between two tools (either order), with total count
    pub fn matchups_for_tools(
        &self,
        tool_x: ToolId,
        tool_y: ToolId,
        limit: i64,
    ) -> Result<(Vec<MatchupView>, i64), StoreError> {
        let (a, b) = (tool_x.min(tool_y), tool_x.max(tool_y));
        let conn = self.db.lock()?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM matchups WHERE tool_a = ?1 AND tool_b = ?2 AND status = 'active'",
            params![a, b],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE m.tool_a = ?1 AND m.tool_b = ?2 AND m.status = 'active'
             ORDER BY m.created_at DESC, m.matchup_id DESC LIMIT ?3",
            VIEW_SELECT
        ))?;
        let recent = stmt
            .query_map(params![a, b, limit], view_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((recent, total))
    }
}

/// Load a matchup on an already-held connection (used inside vote transactions)
pub fn load_matchup(conn: &Connection, matchup_id: MatchupId) -> rusqlite::Result<Option<Matchup>> {
    conn.query_row(
        &format!("SELECT {} FROM matchups WHERE matchup_id = ?1", Matchup::COLUMNS),
        params![matchup_id],
        Matchup::from_row,
    )
    .optional()
}
