//! Sync log types: the append-only audit trail of synchronization attempts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The mutation that triggered a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    /// A new entity was persisted.
    Create,
    /// An existing entity changed (possibly including a rename).
    Update,
    /// An entity was removed.
    Delete,
}

impl SyncOperation {
    /// Returns the operation as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Parses an operation string, defaulting to `Update`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "create" => Self::Create,
            "delete" => Self::Delete,
            _ => Self::Update,
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a sync attempt.
///
/// Only `DbToGit` is produced by the write path today; `GitToDb` is recorded
/// by import tooling so the log schema covers both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncDirection {
    /// Database row mirrored out to the git working copy.
    #[serde(rename = "db-to-git")]
    DbToGit,
    /// Git file imported back into the database.
    #[serde(rename = "git-to-db")]
    GitToDb,
}

impl SyncDirection {
    /// Returns the direction as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DbToGit => "db-to-git",
            Self::GitToDb => "git-to-db",
        }
    }

    /// Parses a direction string, defaulting to `DbToGit`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s == "git-to-db" { Self::GitToDb } else { Self::DbToGit }
    }
}

/// Status of a sync log row.
///
/// State machine: created as `Pending`, transitions exactly once to
/// `Success` or `Failed`, never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncLogStatus {
    /// Attempt created but not yet finished.
    Pending,
    /// Attempt finished successfully (including no-op commits).
    Success,
    /// Attempt raised an error.
    Failed,
}

impl SyncLogStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Parses a status string, defaulting to `Pending`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

impl fmt::Display for SyncLogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the append-only sync audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogEntry {
    /// Log row id (UUIDv7, so rows sort by creation time).
    pub id: String,
    /// Kind of the entity being synced.
    pub entity_type: super::EntityKind,
    /// Logical entity id, stable across renames.
    pub entity_id: String,
    /// The mutation that triggered the attempt.
    pub operation: SyncOperation,
    /// Sync direction.
    pub direction: SyncDirection,
    /// Row status.
    pub status: SyncLogStatus,
    /// When the attempt began (Unix epoch seconds).
    pub started_at: u64,
    /// When the attempt finished, or `None` while pending.
    pub completed_at: Option<u64>,
    /// Error message, populated only on failure.
    pub error: Option<String>,
    /// Resulting commit id, set only on success when a commit was produced.
    pub git_commit_sha: Option<String>,
    /// User id that triggered the attempt, or `"system"`.
    pub synced_by: String,
}

impl SyncLogEntry {
    /// Returns true if the row reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self.status, SyncLogStatus::Success | SyncLogStatus::Failed)
    }
}
