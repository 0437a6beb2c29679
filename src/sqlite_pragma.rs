//! Connection-level PRAGMAs shared by every handle opened on the vote database

use rusqlite::Connection;
use std::time::Duration;

/// Busy timeout applied to every connection.
///
/// Writers take the database lock up front (IMMEDIATE transactions), so a
/// concurrent submitter waits here instead of failing with SQLITE_BUSY.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Apply WAL journaling, relaxed fsync, busy timeout and foreign keys.
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}
