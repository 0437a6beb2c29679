//! Post/tool directory access
//!
//! The blog side owns these tables; the vote core only reads post→tool
//! ownership and tool status. The insert helpers exist for seeding and tests.

use crate::model::{PostId, ToolId, ToolStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tool {
    pub tool_id: ToolId,
    pub slug: String,
    pub name: String,
    pub status: ToolStatus,
}

impl Tool {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            tool_id: row.get(0)?,
            slug: row.get(1)?,
            name: row.get(2)?,
            status: row.get(3)?,
        })
    }
}

/// A post joined with its owning tool's status
#[derive(Debug, Clone, PartialEq)]
pub struct PostOwner {
    pub post_id: PostId,
    pub tool_id: ToolId,
    pub tool_status: ToolStatus,
}

pub fn post_with_tool(conn: &Connection, post_id: PostId) -> rusqlite::Result<Option<PostOwner>> {
    conn.query_row(
        "SELECT p.post_id, p.tool_id, t.status
         FROM posts p JOIN tools t ON t.tool_id = p.tool_id
         WHERE p.post_id = ?1",
        params![post_id],
        |row| {
            Ok(PostOwner {
                post_id: row.get(0)?,
                tool_id: row.get(1)?,
                tool_status: row.get(2)?,
            })
        },
    )
    .optional()
}

pub fn get_tool(conn: &Connection, tool_id: ToolId) -> rusqlite::Result<Option<Tool>> {
    conn.query_row(
        "SELECT tool_id, slug, name, status FROM tools WHERE tool_id = ?1",
        params![tool_id],
        Tool::from_row,
    )
    .optional()
}

pub fn find_tool_by_slug(conn: &Connection, slug: &str) -> rusqlite::Result<Option<Tool>> {
    conn.query_row(
        "SELECT tool_id, slug, name, status FROM tools WHERE slug = ?1",
        params![slug],
        Tool::from_row,
    )
    .optional()
}

/// Tools that take part in stats: active and pending (pre-launch), by id
pub fn ranked_tools(conn: &Connection) -> rusqlite::Result<Vec<Tool>> {
    let mut stmt = conn.prepare_cached(
        "SELECT tool_id, slug, name, status FROM tools
         WHERE status IN ('active', 'pending')
         ORDER BY tool_id",
    )?;
    let tools = stmt
        .query_map([], Tool::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tools)
}

pub fn insert_tool(
    conn: &Connection,
    slug: &str,
    name: &str,
    status: ToolStatus,
) -> rusqlite::Result<ToolId> {
    conn.execute(
        "INSERT INTO tools (slug, name, status) VALUES (?1, ?2, ?3)",
        params![slug, name, status],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn set_tool_status(conn: &Connection, tool_id: ToolId, status: ToolStatus) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "UPDATE tools SET status = ?1 WHERE tool_id = ?2",
        params![status, tool_id],
    )?;
    Ok(n > 0)
}

pub fn insert_post(
    conn: &Connection,
    tool_id: ToolId,
    title: &str,
    category: Option<&str>,
    created_at: i64,
) -> rusqlite::Result<PostId> {
    conn.execute(
        "INSERT INTO posts (tool_id, title, category, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![tool_id, title, category, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}
