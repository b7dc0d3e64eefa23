//! # Vaultsync
//!
//! A git-backed dual-write synchronization engine for knowledge entities.
//!
//! Vaultsync keeps a relational store (the source of truth for reads and
//! queries) consistent with a human-reviewable, version-controlled markdown
//! mirror: one file per entity, committed to a local git repository. The
//! mirror provides audit history, diffability, rollback, and external review
//! on top of data that is otherwise only visible as opaque database rows.
//!
//! Four entity kinds (skills, customer profiles, prompt blocks, and
//! prompt modifiers) are mirrored through a single generic engine
//! parameterized by an [`EntityAdapter`](sync::EntityAdapter).
//!
//! ## Example
//!
//! ```rust,ignore
//! use vaultsync::{SyncService, VaultConfig, CommitAuthor};
//!
//! let service = SyncService::open(&config)?;
//! let stored = service.create(entity, &author, "jdoe")?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod git;
pub mod models;
pub mod observability;
pub mod slug;
pub mod storage;
pub mod sync;

// Re-exports for convenience
pub use config::VaultConfig;
pub use git::{CommitAuthor, CommitInfo, GitWorkspace};
pub use models::{
    EntityKind, EntityRecord, ReviewStatus, SyncDirection, SyncLogEntry, SyncLogStatus,
    SyncOperation, SyncStatus,
};
pub use storage::{EntityStore, FileStore, SyncLogStore};
pub use sync::{
    EntityAdapter, HealthService, KindHealth, Reconciler, SyncEngine, SyncHealthReport,
    SyncReport, SyncService,
};

/// Error type for vaultsync operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Unsafe slugs, unknown entity kinds, malformed front matter |
/// | `OperationFailed` | I/O errors, git operations fail, database queries fail |
/// | `NotFound` | Entity or sync log row does not exist |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A slug contains path-traversal characters
    /// - An entity kind or status string cannot be parsed
    /// - Front matter YAML is malformed or missing its closing delimiter
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` operations on the entity or sync-log tables fail
    /// - Filesystem I/O under the mirror directory fails
    /// - A git operation (stage, commit, history, diff, push) fails
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Result type alias for vaultsync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Centralized so every store and the sync engine agree on the clock.
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
