//! Storage backends: the relational source of truth and the markdown mirror.
//!
//! Three stores live here:
//! - [`EntityStore`]: `SQLite` table holding entity rows and their cached
//!   sync fields.
//! - [`SyncLogStore`]: `SQLite` append-only audit trail of sync attempts.
//! - [`FileStore`]: the markdown mirror on disk inside the git working
//!   tree, one file per entity.

mod filestore;
pub mod frontmatter;
pub mod sqlite;

pub use filestore::FileStore;
pub use sqlite::{EntityStore, SyncLogStore};
