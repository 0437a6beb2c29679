//! Append-only audit log (`vote_events`)
//!
//! Events are written on the same connection, inside the same transaction,
//! as the decision they record.

use crate::model::{Category, MatchupId, UserId, VoteEventType};
use rusqlite::{params, Connection};
use serde::Serialize;
use serde_json::Value;

/// One accept/reject/lock decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteEvent {
    pub event_type: VoteEventType,
    pub user_id: UserId,
    pub matchup_id: MatchupId,
    /// Raw category names as requested; rejected payloads may hold invalid ones
    pub categories: Vec<String>,
    pub error_code: Option<String>,
    pub metadata: Value,
}

impl VoteEvent {
    pub fn new(event_type: VoteEventType, user_id: UserId, matchup_id: MatchupId) -> Self {
        Self {
            event_type,
            user_id,
            matchup_id,
            categories: Vec::new(),
            error_code: None,
            metadata: Value::Null,
        }
    }

    pub fn categories<S: AsRef<str>>(mut self, categories: impl IntoIterator<Item = S>) -> Self {
        self.categories = categories.into_iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn category(self, category: Category) -> Self {
        self.categories([category.as_str()])
    }

    pub fn error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

pub fn record_event(conn: &Connection, event: &VoteEvent, now: i64) -> Result<i64, crate::error::StoreError> {
    let categories = serde_json::to_string(&event.categories)?;
    let metadata = if event.metadata.is_null() {
        None
    } else {
        Some(serde_json::to_string(&event.metadata)?)
    };

    conn.execute(
        "INSERT INTO vote_events (event_type, user_id, matchup_id, categories, error_code, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_type,
            event.user_id,
            event.matchup_id,
            categories,
            event.error_code,
            metadata,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Events for one (user, matchup), oldest first
pub fn events_for(
    conn: &Connection,
    user_id: UserId,
    matchup_id: MatchupId,
) -> Result<Vec<VoteEvent>, crate::error::StoreError> {
    let mut stmt = conn.prepare(
        "SELECT event_type, categories, error_code, metadata FROM vote_events
         WHERE user_id = ?1 AND matchup_id = ?2 ORDER BY event_id",
    )?;
    let rows = stmt
        .query_map(params![user_id, matchup_id], |row| {
            Ok((
                row.get::<_, VoteEventType>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(event_type, categories, error_code, metadata)| {
            Ok(VoteEvent {
                event_type,
                user_id,
                matchup_id,
                categories: serde_json::from_str(&categories)?,
                error_code,
                metadata: match metadata {
                    Some(m) => serde_json::from_str(&m)?,
                    None => Value::Null,
                },
            })
        })
        .collect()
}
