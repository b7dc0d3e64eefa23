//! Domain types for the synchronization engine.

mod entity;
mod sync_log;

pub use entity::{EntityKind, EntityRecord, ReviewStatus, SyncStatus};
pub use sync_log::{SyncDirection, SyncLogEntry, SyncLogStatus, SyncOperation};
