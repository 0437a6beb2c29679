//! Job log sinks for the aggregation engine

use crate::clock::Clock;
use crate::db::Database;
use crate::error::StoreError;
use rusqlite::params;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};

pub trait JobLog: Send + Sync {
    fn log_job_start(&self, job_name: &str) -> Result<i64, StoreError>;
    fn log_job_complete(&self, job_id: i64, details: &Value) -> Result<(), StoreError>;
    fn log_job_failure(&self, job_id: i64, error: &str) -> Result<(), StoreError>;
}

/// Persists job runs to the `job_log` table
pub struct SqliteJobLog {
    db: Database,
    clock: Clock,
}

impl SqliteJobLog {
    pub fn new(db: Database, clock: Clock) -> Self {
        Self { db, clock }
    }
}

impl JobLog for SqliteJobLog {
    fn log_job_start(&self, job_name: &str) -> Result<i64, StoreError> {
        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO job_log (job_name, status, started_at) VALUES (?1, 'running', ?2)",
            params![job_name, (self.clock)()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn log_job_complete(&self, job_id: i64, details: &Value) -> Result<(), StoreError> {
        let conn = self.db.lock()?;
        conn.execute(
            "UPDATE job_log SET status = 'completed', finished_at = ?1, details = ?2 WHERE job_id = ?3",
            params![(self.clock)(), serde_json::to_string(details)?, job_id],
        )?;
        Ok(())
    }

    fn log_job_failure(&self, job_id: i64, error: &str) -> Result<(), StoreError> {
        let conn = self.db.lock()?;
        conn.execute(
            "UPDATE job_log SET status = 'failed', finished_at = ?1, error = ?2 WHERE job_id = ?3",
            params![(self.clock)(), error, job_id],
        )?;
        Ok(())
    }
}

/// Log-only sink (no persistence)
#[derive(Debug, Default)]
pub struct LogJobLog {
    next_id: AtomicI64,
}

impl LogJobLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobLog for LogJobLog {
    fn log_job_start(&self, job_name: &str) -> Result<i64, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("job #{} started: {}", id, job_name);
        Ok(id)
    }

    fn log_job_complete(&self, job_id: i64, details: &Value) -> Result<(), StoreError> {
        log::debug!("job #{} completed: {}", job_id, details);
        Ok(())
    }

    fn log_job_failure(&self, job_id: i64, error: &str) -> Result<(), StoreError> {
        log::debug!("job #{} failed: {}", job_id, error);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;
    use serde_json::json;

    #[test]
    fn test_sqlite_job_log_lifecycle() {
        let (_dir, db) = test_db();
        let log = SqliteJobLog::new(db.clone(), fixed_clock(NOW));

        let ok = log.log_job_start("tool_stats").unwrap();
        log.log_job_complete(ok, &json!({"rows": 10})).unwrap();
        let bad = log.log_job_start("h2h_stats").unwrap();
        log.log_job_failure(bad, "disk full").unwrap();

        let conn = db.lock().unwrap();
        let (status, details): (String, String) = conn
            .query_row(
                "SELECT status, details FROM job_log WHERE job_id = ?1",
                params![ok],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(status, "completed");
        assert_eq!(details, r#"{"rows":10}"#);

        let (status, error): (String, String) = conn
            .query_row(
                "SELECT status, error FROM job_log WHERE job_id = ?1",
                params![bad],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(status, "failed");
        assert_eq!(error, "disk full");
    }

    #[test]
    fn test_log_job_log_ids_increase() {
        let log = LogJobLog::new();
        let a = log.log_job_start("a").unwrap();
        let b = log.log_job_start("b").unwrap();
        assert!(b > a);
    }
}
