//! Entity table: the relational source of truth.

use super::{acquire_lock, configure_connection};
use crate::models::{EntityKind, EntityRecord, ReviewStatus, SyncStatus};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::PathBuf;
use std::sync::Mutex;

/// Counts of entities grouped by cached sync status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatusCounts {
    /// Entities whose mirror matches the row.
    pub synced: u64,
    /// Entities awaiting a sync attempt.
    pub pending: u64,
    /// Entities whose last attempt failed.
    pub failed: u64,
    /// Entities never synchronized.
    pub unknown: u64,
}

impl StatusCounts {
    /// Total entity count across all statuses.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.synced + self.pending + self.failed + self.unknown
    }
}

/// `SQLite`-backed entity store.
pub struct EntityStore {
    /// Connection to the database.
    conn: Mutex<Connection>,
}

impl EntityStore {
    /// Opens (and initializes) the entity store at a database path.
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
            operation: "open_entity_db".to_string(),
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
            operation: "open_entity_db_memory".to_string(),
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
            "CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                slug TEXT NOT NULL,
                body TEXT NOT NULL DEFAULT '',
                categories TEXT NOT NULL DEFAULT '[]',
                owner TEXT,
                source_ref TEXT,
                review_status TEXT NOT NULL DEFAULT 'published',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                sync_status TEXT NOT NULL DEFAULT 'unknown',
                last_synced_at INTEGER,
                git_commit_sha TEXT,
                UNIQUE (kind, slug)
            )",
            [],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_entities_table".to_string(),
            cause: e.to_string(),
        })?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entities_kind_status
             ON entities(kind, sync_status)",
            [],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_entities_status_index".to_string(),
            cause: e.to_string(),
        })?;

        Ok(())
    }

    /// Inserts a new entity row.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (including slug collisions
    /// within a kind).
    pub fn insert(&self, entity: &EntityRecord) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let categories = serde_json::to_string(&entity.categories).unwrap_or_else(|_| "[]".into());

        // Cast u64 to i64 for SQLite compatibility (rusqlite doesn't impl ToSql for u64)
        #[allow(clippy::cast_possible_wrap)]
        let (created_at, updated_at) = (entity.created_at as i64, entity.updated_at as i64);
        #[allow(clippy::cast_possible_wrap)]
        let last_synced_at = entity.last_synced_at.map(|t| t as i64);

        conn.execute(
            "INSERT INTO entities (
                id, kind, title, slug, body, categories, owner, source_ref,
                review_status, created_at, updated_at, sync_status,
                last_synced_at, git_commit_sha
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                entity.id,
                entity.kind.as_str(),
                entity.title,
                entity.slug,
                entity.body,
                categories,
                entity.owner,
                entity.source_ref,
                entity.review_status.as_str(),
                created_at,
                updated_at,
                entity.sync_status.as_str(),
                last_synced_at,
                entity.git_commit_sha,
            ],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "insert_entity".to_string(),
            cause: e.to_string(),
        })?;

        Ok(())
    }

    /// Updates the mutable display fields of an entity row.
    ///
    /// Sync fields are owned by the engine and updated separately through
    /// [`Self::record_sync_success`] / [`Self::record_sync_failure`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entity does not exist.
    pub fn update(&self, entity: &EntityRecord) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let categories = serde_json::to_string(&entity.categories).unwrap_or_else(|_| "[]".into());
        #[allow(clippy::cast_possible_wrap)]
        let updated_at = entity.updated_at as i64;

        let changed = conn
            .execute(
                "UPDATE entities SET
                    title = ?2, slug = ?3, body = ?4, categories = ?5,
                    owner = ?6, source_ref = ?7, review_status = ?8,
                    updated_at = ?9
                 WHERE id = ?1",
                params![
                    entity.id,
                    entity.title,
                    entity.slug,
                    entity.body,
                    categories,
                    entity.owner,
                    entity.source_ref,
                    entity.review_status.as_str(),
                    updated_at,
                ],
            )
            .map_err(|e| Error::OperationFailed {
                operation: "update_entity".to_string(),
                cause: e.to_string(),
            })?;

        if changed == 0 {
            return Err(Error::NotFound(format!("entity {}", entity.id)));
        }
        Ok(())
    }

    /// Updates only the stored slug, used after a rename lands in git.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_slug(&self, id: &str, slug: &str) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "UPDATE entities SET slug = ?2 WHERE id = ?1",
            params![id, slug],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "update_entity_slug".to_string(),
            cause: e.to_string(),
        })?;
        Ok(())
    }

    /// Fetches an entity by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: &str) -> Result<Option<EntityRecord>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM entities WHERE id = ?1"),
            params![id],
            row_to_entity,
        )
        .optional()
        .map_err(|e| Error::OperationFailed {
            operation: "get_entity".to_string(),
            cause: e.to_string(),
        })
    }

    /// Deletes an entity row. Returns false if no row existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let changed = conn
            .execute("DELETE FROM entities WHERE id = ?1", params![id])
            .map_err(|e| Error::OperationFailed {
                operation: "delete_entity".to_string(),
                cause: e.to_string(),
            })?;
        Ok(changed > 0)
    }

    /// Lists all entities of a kind in slug order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self, kind: EntityKind) -> Result<Vec<EntityRecord>> {
        self.query_list(
            &format!("SELECT {COLUMNS} FROM entities WHERE kind = ?1 ORDER BY slug"),
            kind,
        )
    }

    /// Lists entities of a kind whose cached status is not `synced`, in
    /// slug order. This is the reconciler's work queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_needing_sync(&self, kind: EntityKind) -> Result<Vec<EntityRecord>> {
        self.query_list(
            &format!(
                "SELECT {COLUMNS} FROM entities
                 WHERE kind = ?1 AND sync_status != 'synced'
                 ORDER BY slug"
            ),
            kind,
        )
    }

    fn query_list(&self, sql: &str, kind: EntityKind) -> Result<Vec<EntityRecord>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn.prepare(sql).map_err(|e| Error::OperationFailed {
            operation: "prepare_entity_list".to_string(),
            cause: e.to_string(),
        })?;

        let rows = stmt
            .query_map(params![kind.as_str()], row_to_entity)
            .map_err(|e| Error::OperationFailed {
                operation: "list_entities".to_string(),
                cause: e.to_string(),
            })?;

        let mut entities = Vec::new();
        for row in rows {
            entities.push(row.map_err(|e| Error::OperationFailed {
                operation: "read_entity_row".to_string(),
                cause: e.to_string(),
            })?);
        }
        Ok(entities)
    }

    /// Returns true if the slug is already held by a different entity of
    /// the same kind. Callers use this to trigger collision disambiguation.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn slug_taken(&self, kind: EntityKind, slug: &str, exclude_id: &str) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entities WHERE kind = ?1 AND slug = ?2 AND id != ?3",
                params![kind.as_str(), slug, exclude_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::OperationFailed {
                operation: "check_slug_taken".to_string(),
                cause: e.to_string(),
            })?;
        Ok(count > 0)
    }

    /// Marks an entity as having a sync attempt in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_sync_pending(&self, id: &str) -> Result<()> {
        self.set_status(id, SyncStatus::Pending)
    }

    /// Records a successful sync attempt.
    ///
    /// A `None` commit SHA means the attempt was a no-op: the entity is
    /// still marked `synced`, but the previously recorded commit SHA and
    /// timestamp are kept rather than overwritten with nulls.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn record_sync_success(&self, id: &str, sha: Option<&str>, now: u64) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        #[allow(clippy::cast_possible_wrap)]
        let now = now as i64;
        let result = match sha {
            Some(sha) => conn.execute(
                "UPDATE entities SET sync_status = 'synced',
                    last_synced_at = ?2, git_commit_sha = ?3
                 WHERE id = ?1",
                params![id, now, sha],
            ),
            None => conn.execute(
                "UPDATE entities SET sync_status = 'synced' WHERE id = ?1",
                params![id],
            ),
        };
        result.map_err(|e| Error::OperationFailed {
            operation: "record_sync_success".to_string(),
            cause: e.to_string(),
        })?;
        Ok(())
    }

    /// Records a failed sync attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn record_sync_failure(&self, id: &str) -> Result<()> {
        self.set_status(id, SyncStatus::Failed)
    }

    fn set_status(&self, id: &str, status: SyncStatus) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "UPDATE entities SET sync_status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "set_entity_sync_status".to_string(),
            cause: e.to_string(),
        })?;
        Ok(())
    }

    /// Counts entities of a kind grouped by cached sync status.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn counts_by_status(&self, kind: EntityKind) -> Result<StatusCounts> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT sync_status, COUNT(*) FROM entities
                 WHERE kind = ?1 GROUP BY sync_status",
            )
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_status_counts".to_string(),
                cause: e.to_string(),
            })?;

        let rows = stmt
            .query_map(params![kind.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| Error::OperationFailed {
                operation: "query_status_counts".to_string(),
                cause: e.to_string(),
            })?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, count) = row.map_err(|e| Error::OperationFailed {
                operation: "read_status_count_row".to_string(),
                cause: e.to_string(),
            })?;
            #[allow(clippy::cast_sign_loss)]
            let count = count as u64;
            match SyncStatus::parse(&status) {
                SyncStatus::Synced => counts.synced = count,
                SyncStatus::Pending => counts.pending = count,
                SyncStatus::Failed => counts.failed = count,
                SyncStatus::Unknown => counts.unknown += count,
            }
        }
        Ok(counts)
    }
}

const COLUMNS: &str = "id, kind, title, slug, body, categories, owner, source_ref, \
     review_status, created_at, updated_at, sync_status, last_synced_at, git_commit_sha";

fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<EntityRecord> {
    let kind: String = row.get(1)?;
    let categories: String = row.get(5)?;
    let review_status: String = row.get(8)?;
    let sync_status: String = row.get(11)?;

    // Timestamps are stored as i64 (rusqlite doesn't impl FromSql for u64)
    let created_at: i64 = row.get(9)?;
    let updated_at: i64 = row.get(10)?;
    let last_synced_at: Option<i64> = row.get(12)?;
    #[allow(clippy::cast_sign_loss)]
    let (created_at, updated_at) = (created_at as u64, updated_at as u64);
    #[allow(clippy::cast_sign_loss)]
    let last_synced_at = last_synced_at.map(|t| t as u64);

    Ok(EntityRecord {
        id: row.get(0)?,
        kind: EntityKind::parse(&kind).unwrap_or(EntityKind::Skill),
        title: row.get(2)?,
        slug: row.get(3)?,
        body: row.get(4)?,
        categories: serde_json::from_str(&categories).unwrap_or_default(),
        owner: row.get(6)?,
        source_ref: row.get(7)?,
        review_status: ReviewStatus::parse(&review_status),
        created_at,
        updated_at,
        sync_status: SyncStatus::parse(&sync_status),
        last_synced_at,
        git_commit_sha: row.get(13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(title: &str, slug: &str) -> EntityRecord {
        let mut entity = EntityRecord::new(EntityKind::Skill, title, "body");
        entity.slug = slug.to_string();
        entity
    }

    #[test]
    fn test_insert_and_get() {
        let store = EntityStore::in_memory().unwrap();
        let entity = skill("Access Management", "access-management");
        store.insert(&entity).unwrap();

        let fetched = store.get(&entity.id).unwrap().unwrap();
        assert_eq!(fetched.title, "Access Management");
        assert_eq!(fetched.slug, "access-management");
        assert_eq!(fetched.sync_status, SyncStatus::Unknown);
    }

    #[test]
    fn test_timestamps_round_trip_through_storage() {
        let store = EntityStore::in_memory().unwrap();
        let mut entity = skill("A", "a");
        entity.created_at = 1_700_000_000;
        entity.updated_at = 1_700_000_001;
        entity.last_synced_at = Some(1_700_000_002);
        store.insert(&entity).unwrap();

        let fetched = store.get(&entity.id).unwrap().unwrap();
        assert_eq!(fetched.created_at, 1_700_000_000);
        assert_eq!(fetched.updated_at, 1_700_000_001);
        assert_eq!(fetched.last_synced_at, Some(1_700_000_002));
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = EntityStore::in_memory().unwrap();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_slug_unique_per_kind() {
        let store = EntityStore::in_memory().unwrap();
        store.insert(&skill("A", "same-slug")).unwrap();
        assert!(store.insert(&skill("B", "same-slug")).is_err());

        // Same slug on a different kind is fine.
        let mut profile = EntityRecord::new(EntityKind::CustomerProfile, "B", "body");
        profile.slug = "same-slug".to_string();
        store.insert(&profile).unwrap();
    }

    #[test]
    fn test_slug_taken_excludes_self() {
        let store = EntityStore::in_memory().unwrap();
        let entity = skill("A", "taken");
        store.insert(&entity).unwrap();

        assert!(!store
            .slug_taken(EntityKind::Skill, "taken", &entity.id)
            .unwrap());
        assert!(store.slug_taken(EntityKind::Skill, "taken", "other-id").unwrap());
        assert!(!store
            .slug_taken(EntityKind::CustomerProfile, "taken", "other-id")
            .unwrap());
    }

    #[test]
    fn test_update_display_fields() {
        let store = EntityStore::in_memory().unwrap();
        let mut entity = skill("Old", "old");
        store.insert(&entity).unwrap();

        entity.title = "New Title".to_string();
        entity.body = "new body".to_string();
        entity.categories = vec!["iam".to_string()];
        store.update(&entity).unwrap();

        let fetched = store.get(&entity.id).unwrap().unwrap();
        assert_eq!(fetched.title, "New Title");
        assert_eq!(fetched.categories, vec!["iam"]);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = EntityStore::in_memory().unwrap();
        let entity = skill("Ghost", "ghost");
        assert!(matches!(store.update(&entity), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_sync_success_with_sha() {
        let store = EntityStore::in_memory().unwrap();
        let entity = skill("A", "a");
        store.insert(&entity).unwrap();

        store.record_sync_success(&entity.id, Some("abc123"), 1000).unwrap();
        let fetched = store.get(&entity.id).unwrap().unwrap();
        assert_eq!(fetched.sync_status, SyncStatus::Synced);
        assert_eq!(fetched.git_commit_sha.as_deref(), Some("abc123"));
        assert_eq!(fetched.last_synced_at, Some(1000));
    }

    #[test]
    fn test_noop_sync_keeps_previous_sha() {
        let store = EntityStore::in_memory().unwrap();
        let entity = skill("A", "a");
        store.insert(&entity).unwrap();

        store.record_sync_success(&entity.id, Some("abc123"), 1000).unwrap();
        store.record_sync_failure(&entity.id).unwrap();
        store.record_sync_success(&entity.id, None, 2000).unwrap();

        let fetched = store.get(&entity.id).unwrap().unwrap();
        assert_eq!(fetched.sync_status, SyncStatus::Synced);
        // No-op must not overwrite the previously recorded commit state.
        assert_eq!(fetched.git_commit_sha.as_deref(), Some("abc123"));
        assert_eq!(fetched.last_synced_at, Some(1000));
    }

    #[test]
    fn test_list_needing_sync_is_slug_ordered() {
        let store = EntityStore::in_memory().unwrap();
        let synced = skill("S", "a-synced");
        let failed = skill("F", "z-failed");
        let fresh = skill("N", "m-fresh");
        store.insert(&synced).unwrap();
        store.insert(&failed).unwrap();
        store.insert(&fresh).unwrap();

        store.record_sync_success(&synced.id, Some("sha"), 1).unwrap();
        store.record_sync_failure(&failed.id).unwrap();

        let needing: Vec<String> = store
            .list_needing_sync(EntityKind::Skill)
            .unwrap()
            .into_iter()
            .map(|e| e.slug)
            .collect();
        assert_eq!(needing, vec!["m-fresh", "z-failed"]);
    }

    #[test]
    fn test_counts_by_status_arithmetic() {
        let store = EntityStore::in_memory().unwrap();
        let a = skill("A", "a");
        let b = skill("B", "b");
        let c = skill("C", "c");
        store.insert(&a).unwrap();
        store.insert(&b).unwrap();
        store.insert(&c).unwrap();

        store.record_sync_success(&a.id, Some("sha"), 1).unwrap();
        store.record_sync_failure(&b.id).unwrap();

        let counts = store.counts_by_status(EntityKind::Skill).unwrap();
        assert_eq!(counts.synced, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.unknown, 1);
        assert_eq!(counts.pending, 0);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_delete() {
        let store = EntityStore::in_memory().unwrap();
        let entity = skill("A", "a");
        store.insert(&entity).unwrap();

        assert!(store.delete(&entity.id).unwrap());
        assert!(!store.delete(&entity.id).unwrap());
        assert!(store.get(&entity.id).unwrap().is_none());
    }
}
