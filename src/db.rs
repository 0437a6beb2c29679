//! Shared SQLite handle and schema migration loader
//!
//! Every component (registry, vote pipeline, aggregation engine, API) holds a
//! clone of [`Database`]. The handle wraps a single connection behind a mutex;
//! cross-process writers are serialized by SQLite itself through IMMEDIATE
//! transactions and the busy timeout set in [`crate::sqlite_pragma`].
//!
//! Tables (see `/sql/` directory):
//! - `tools`, `posts`, `user_subscriptions` - directory collaborators
//! - `matchups` - Matchup Registry
//! - `votes` - Vote Ledger
//! - `vote_events` - append-only audit log
//! - `tool_stats`, `h2h_stats`, `user_vote_stats` - materialized aggregates
//! - `job_log` - aggregation job bookkeeping

use crate::error::StoreError;
use crate::sqlite_pragma::apply_optimized_pragmas;
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Cloneable handle to the vote database
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file and apply connection PRAGMAs.
    ///
    /// Parent directories are created if missing. Does NOT run migrations;
    /// call [`run_schema_migrations`] on the handle first.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        apply_optimized_pragmas(&conn)?;

        Ok(Self::from_connection(conn))
    }

    /// Wrap an already-configured connection
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Open the database and bring its schema up to date in one step
    pub fn open_and_migrate(
        db_path: impl AsRef<Path>,
        schema_dir: impl AsRef<Path>,
    ) -> Result<Self, StoreError> {
        let db = Self::open(db_path)?;
        {
            let mut conn = db.lock()?;
            run_schema_migrations(&mut conn, schema_dir)?;
        }
        Ok(db)
    }

    /// Acquire the connection.
    ///
    /// A poisoned mutex means a writer panicked mid-call; its transaction was
    /// rolled back on drop, but we refuse to hand the connection out again.
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// Run schema migrations from SQL files
///
/// Reads all .sql files from the specified directory and executes them in
/// file-name order (`00_`, `01_`, ...). All SQL files must use
/// "IF NOT EXISTS" clauses so the loader is idempotent.
///
/// Example:
/// ```no_run
/// # use compare_vote::db::run_schema_migrations;
/// let mut conn = rusqlite::Connection::open("compare_vote.db")?;
/// run_schema_migrations(&mut conn, "sql")?;
/// # Ok::<(), compare_vote::error::StoreError>(())
/// ```
pub fn run_schema_migrations(
    conn: &mut Connection,
    schema_dir: impl AsRef<Path>,
) -> Result<(), StoreError> {
    let schema_path = schema_dir.as_ref();

    if !schema_path.exists() {
        return Err(StoreError::SchemaNotFound(schema_path.display().to_string()));
    }

    conn.pragma_update(None, "journal_mode", "WAL")?;

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 Running schema migrations from: {}", schema_path.display());

    for entry in sql_files {
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().into_owned();

        log::debug!("   ├─ Executing: {}", filename);

        let sql_content = fs::read_to_string(&path)?;
        conn.execute_batch(&sql_content)?;
    }

    log::info!("✅ All schema migrations completed successfully");

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let (_dir, db) = test_db();
        let mut conn = db.lock().unwrap();

        // Second run must not fail on existing objects
        run_schema_migrations(&mut conn, SCHEMA_DIR).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('tools', 'posts', 'matchups', 'votes', 'vote_events',
                  'tool_stats', 'h2h_stats', 'user_vote_stats', 'job_log')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 9);
    }

    #[test]
    fn test_missing_schema_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("x.db")).unwrap();
        let mut conn = db.lock().unwrap();

        let err = run_schema_migrations(&mut conn, dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, StoreError::SchemaNotFound(_)));
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c/votes.db");

        Database::open(&nested).unwrap();
        assert!(nested.exists());
    }
}
