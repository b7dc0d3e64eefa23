//! Sync log table: append-only audit trail of synchronization attempts.
//!
//! Rows are created as `pending` immediately before an attempt begins and
//! transition exactly once to `success` or `failed` when it finishes. Rows
//! are never deleted; the table is the audit trail.

use super::{acquire_lock, configure_connection};
use crate::models::{EntityKind, SyncDirection, SyncLogEntry, SyncLogStatus, SyncOperation};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::PathBuf;
use std::sync::Mutex;

/// `SQLite`-backed sync log store.
pub struct SyncLogStore {
    /// Connection to the database.
    conn: Mutex<Connection>,
}

impl SyncLogStore {
    /// Opens (and initializes) the sync log store at a database path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_db_dir".to_string(),
                cause: e.to_string(),
            })?;
        }

        let conn = Connection::open(&db_path).map_err(|e| Error::OperationFailed {
            operation: "open_sync_log_db".to_string(),
            cause: e.to_string(),
        })?;
        configure_connection(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
            operation: "open_sync_log_db_memory".to_string(),
            cause: e.to_string(),
        })?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Initializes the schema.
    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sync_log (
                id TEXT PRIMARY KEY,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                operation TEXT NOT NULL,
                direction TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                started_at INTEGER NOT NULL,
                completed_at INTEGER,
                error TEXT,
                git_commit_sha TEXT,
                synced_by TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_sync_log_table".to_string(),
            cause: e.to_string(),
        })?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sync_log_entity
             ON sync_log(entity_type, entity_id, started_at)",
            [],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_sync_log_entity_index".to_string(),
            cause: e.to_string(),
        })?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sync_log_status
             ON sync_log(status, started_at)",
            [],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_sync_log_status_index".to_string(),
            cause: e.to_string(),
        })?;

        Ok(())
    }

    /// Creates a `pending` log row for a sync attempt that is about to run.
    /// Returns the log row id.
    ///
    /// Uses UUIDv7 ids so rows sort by creation time.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn begin(
        &self,
        entity_type: EntityKind,
        entity_id: &str,
        operation: SyncOperation,
        direction: SyncDirection,
        synced_by: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::now_v7().to_string();
        // Cast u64 to i64 for SQLite compatibility (rusqlite doesn't impl ToSql for u64)
        #[allow(clippy::cast_possible_wrap)]
        let started_at = crate::current_timestamp() as i64;

        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO sync_log (
                id, entity_type, entity_id, operation, direction,
                status, started_at, synced_by
             ) VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7)",
            params![
                id,
                entity_type.as_str(),
                entity_id,
                operation.as_str(),
                direction.as_str(),
                started_at,
                synced_by,
            ],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "insert_sync_log".to_string(),
            cause: e.to_string(),
        })?;

        Ok(id)
    }

    /// Transitions a pending row to `success`, recording the commit SHA if
    /// one was produced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the row does not exist or already
    /// reached a terminal state; a row transitions exactly once.
    pub fn complete_success(&self, log_id: &str, git_commit_sha: Option<&str>) -> Result<()> {
        self.complete(log_id, SyncLogStatus::Success, git_commit_sha, None)
    }

    /// Transitions a pending row to `failed` with the error message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the row does not exist or already
    /// reached a terminal state.
    pub fn complete_failure(&self, log_id: &str, error: &str) -> Result<()> {
        self.complete(log_id, SyncLogStatus::Failed, None, Some(error))
    }

    fn complete(
        &self,
        log_id: &str,
        status: SyncLogStatus,
        git_commit_sha: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        #[allow(clippy::cast_possible_wrap)]
        let completed_at = crate::current_timestamp() as i64;
        let conn = acquire_lock(&self.conn);

        // Guard on status = 'pending' so a terminal row can never revert
        // or transition twice.
        let changed = conn
            .execute(
                "UPDATE sync_log SET
                    status = ?2, completed_at = ?3, git_commit_sha = ?4, error = ?5
                 WHERE id = ?1 AND status = 'pending'",
                params![log_id, status.as_str(), completed_at, git_commit_sha, error],
            )
            .map_err(|e| Error::OperationFailed {
                operation: "complete_sync_log".to_string(),
                cause: e.to_string(),
            })?;

        if changed == 0 {
            return Err(Error::NotFound(format!("pending sync log row {log_id}")));
        }
        Ok(())
    }

    /// Fetches a log row by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, log_id: &str) -> Result<Option<SyncLogEntry>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM sync_log WHERE id = ?1"),
            params![log_id],
            row_to_entry,
        )
        .optional()
        .map_err(|e| Error::OperationFailed {
            operation: "get_sync_log".to_string(),
            cause: e.to_string(),
        })
    }

    /// Lists log rows for one entity, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_for_entity(
        &self,
        entity_type: EntityKind,
        entity_id: &str,
        limit: usize,
    ) -> Result<Vec<SyncLogEntry>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM sync_log
                 WHERE entity_type = ?1 AND entity_id = ?2
                 ORDER BY started_at DESC, id DESC
                 LIMIT ?3"
            ))
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_sync_log_list".to_string(),
                cause: e.to_string(),
            })?;

        let rows = stmt
            .query_map(
                params![entity_type.as_str(), entity_id, limit as i64],
                row_to_entry,
            )
            .map_err(|e| Error::OperationFailed {
                operation: "list_sync_logs".to_string(),
                cause: e.to_string(),
            })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| Error::OperationFailed {
                operation: "read_sync_log_row".to_string(),
                cause: e.to_string(),
            })?);
        }
        Ok(entries)
    }

    /// Counts failed rows for a kind whose attempt started within the last
    /// `window_secs` seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn recent_failures(&self, entity_type: EntityKind, window_secs: u64) -> Result<u64> {
        #[allow(clippy::cast_possible_wrap)]
        let cutoff = crate::current_timestamp().saturating_sub(window_secs) as i64;
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sync_log
                 WHERE entity_type = ?1 AND status = 'failed' AND started_at >= ?2",
                params![entity_type.as_str(), cutoff],
                |row| row.get(0),
            )
            .map_err(|e| Error::OperationFailed {
                operation: "count_recent_failures".to_string(),
                cause: e.to_string(),
            })?;
        #[allow(clippy::cast_sign_loss)]
        Ok(count as u64)
    }

    /// Counts pending rows older than `older_than_secs`. A pending row
    /// with no completion after a bounded interval is a stuck attempt and
    /// a health signal of its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn stuck_pending(&self, entity_type: EntityKind, older_than_secs: u64) -> Result<u64> {
        #[allow(clippy::cast_possible_wrap)]
        let cutoff = crate::current_timestamp().saturating_sub(older_than_secs) as i64;
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sync_log
                 WHERE entity_type = ?1 AND status = 'pending' AND started_at < ?2",
                params![entity_type.as_str(), cutoff],
                |row| row.get(0),
            )
            .map_err(|e| Error::OperationFailed {
                operation: "count_stuck_pending".to_string(),
                cause: e.to_string(),
            })?;
        #[allow(clippy::cast_sign_loss)]
        Ok(count as u64)
    }
}

const COLUMNS: &str = "id, entity_type, entity_id, operation, direction, status, \
     started_at, completed_at, error, git_commit_sha, synced_by";

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<SyncLogEntry> {
    let entity_type: String = row.get(1)?;
    let operation: String = row.get(3)?;
    let direction: String = row.get(4)?;
    let status: String = row.get(5)?;

    // Timestamps are stored as i64 (rusqlite doesn't impl FromSql for u64)
    let started_at: i64 = row.get(6)?;
    let completed_at: Option<i64> = row.get(7)?;
    #[allow(clippy::cast_sign_loss)]
    let started_at = started_at as u64;
    #[allow(clippy::cast_sign_loss)]
    let completed_at = completed_at.map(|t| t as u64);

    Ok(SyncLogEntry {
        id: row.get(0)?,
        entity_type: EntityKind::parse(&entity_type).unwrap_or(EntityKind::Skill),
        entity_id: row.get(2)?,
        operation: SyncOperation::parse(&operation),
        direction: SyncDirection::parse(&direction),
        status: SyncLogStatus::parse(&status),
        started_at,
        completed_at,
        error: row.get(8)?,
        git_commit_sha: row.get(9)?,
        synced_by: row.get(10)?,
    })
}
