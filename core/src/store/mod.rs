//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Pipeline components call store methods — they never execute SQL directly.
//!
//! The write connection lives on the sink thread; other threads that need a
//! read path call `reopen()` for their own connection to the same file.

use crate::error::AmlResult;
use crate::types::BatchId;
use rusqlite::types::Type;
use rusqlite::Connection;
use rusqlite::params;

mod assessment;
mod client;
mod graph;

pub struct AmlStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl AmlStore {
    pub fn open(path: &str) -> AmlResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: Some(path.to_string()) })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AmlResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases this returns a fresh isolated database; for
    /// file-based databases it opens the same file.
    pub fn reopen(&self) -> AmlResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> AmlResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_assessments.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_clients.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_relationships.sql"))?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// One SQL transaction around a closure, the unit the sink uses per
    /// scored transaction.
    pub fn in_transaction<T>(&self, body: impl FnOnce(&Self) -> AmlResult<T>) -> AmlResult<T> {
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        match body(self) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(value)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(e)
            }
        }
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, started_at: &str, config_json: &str) -> AmlResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, started_at, config_json, status) VALUES (?1, ?2, ?3, 'running')",
            params![run_id, started_at, config_json],
        )?;
        Ok(())
    }

    pub fn finish_run(&self, run_id: &str, finished_at: &str, status: &str) -> AmlResult<()> {
        self.conn.execute(
            "UPDATE run SET finished_at = ?1, status = ?2 WHERE run_id = ?3",
            params![finished_at, status, run_id],
        )?;
        Ok(())
    }

    // ── Batch lifecycle ────────────────────────────────────────

    pub fn upsert_batch(
        &self,
        run_id: &str,
        batch_id: BatchId,
        source: &str,
        state: &str,
        attempts: u32,
        record_count: usize,
    ) -> AmlResult<()> {
        self.conn.execute(
            "INSERT INTO batch (run_id, batch_id, source, state, attempts, record_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(run_id, batch_id) DO UPDATE SET
                state = excluded.state,
                attempts = excluded.attempts",
            params![run_id, batch_id as i64, source, state, attempts, record_count as i64],
        )?;
        Ok(())
    }

    pub fn batch_state(&self, run_id: &str, batch_id: BatchId) -> AmlResult<Option<String>> {
        use rusqlite::OptionalExtension;
        self.conn
            .query_row(
                "SELECT state FROM batch WHERE run_id = ?1 AND batch_id = ?2",
                params![run_id, batch_id as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn batch_count_by_state(&self, run_id: &str, state: &str) -> AmlResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM batch WHERE run_id = ?1 AND state = ?2",
                params![run_id, state],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}

// Row-mapper helpers shared by the submodules.

pub(crate) fn parse_timestamp_column(
    idx: usize,
    raw: String,
) -> rusqlite::Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_json_column<T: serde::de::DeserializeOwned>(
    idx: usize,
    raw: String,
) -> rusqlite::Result<T> {
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_and_run_lifecycle() {
        let store = AmlStore::in_memory().unwrap();
        store.migrate().unwrap();
        store.insert_run("run-1", "2025-04-21T12:00:00+00:00", "{}").unwrap();
        store.upsert_batch("run-1", 0, "export.json", "pending", 0, 10).unwrap();
        store.upsert_batch("run-1", 0, "export.json", "completed", 1, 10).unwrap();
        assert_eq!(store.batch_state("run-1", 0).unwrap().as_deref(), Some("completed"));
        assert_eq!(store.batch_count_by_state("run-1", "completed").unwrap(), 1);
        store.finish_run("run-1", "2025-04-21T12:05:00+00:00", "completed").unwrap();
    }

    #[test]
    fn reopen_file_store_sees_same_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aml.db");
        let store = AmlStore::open(path.to_str().unwrap()).unwrap();
        store.migrate().unwrap();
        store.insert_run("run-1", "2025-04-21T12:00:00+00:00", "{}").unwrap();
        let reader = store.reopen().unwrap();
        assert_eq!(reader.batch_count_by_state("run-1", "failed").unwrap(), 0);
    }
}
