//! The top-level facade over the whole engine.
//!
//! Owns the stores, the git workspace, and one engine per entity kind.
//! Application code talks to this type: entity CRUD with mirroring, log
//! queries, health, reconciliation, and the read-only git surfaces.
//!
//! Ordering inside the mutating operations is fixed: the database write
//! commits first, the mirror follows. A git failure therefore surfaces as
//! an error (and a `failed` status) without ever undoing the database
//! mutation.

use super::adapter::adapter_for;
use super::engine::SyncEngine;
use super::health::{HealthService, SyncHealthReport};
use super::reconcile::{Reconciler, SyncReport};
use crate::config::VaultConfig;
use crate::git::{CommitAuthor, CommitInfo, GitWorkspace};
use crate::models::{EntityKind, EntityRecord, SyncLogEntry};
use crate::storage::{EntityStore, SyncLogStore};
use crate::{Error, Result, current_timestamp, slug};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// The assembled synchronization service.
pub struct SyncService {
    entities: Arc<EntityStore>,
    log: Arc<SyncLogStore>,
    git: Arc<Mutex<GitWorkspace>>,
    engines: Vec<Arc<SyncEngine>>,
    health: HealthService,
    config: VaultConfig,
}

impl SyncService {
    /// Opens the service against a configuration: initializes the mirror
    /// repository if needed, opens the stores, and builds one engine per
    /// entity kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository or a store cannot be opened.
    pub fn open(config: &VaultConfig) -> Result<Self> {
        let workspace = GitWorkspace::init_if_needed(&config.repo_path)?;
        let git = Arc::new(Mutex::new(workspace));
        let entities = Arc::new(EntityStore::open(&config.db_path)?);
        let log = Arc::new(SyncLogStore::open(&config.db_path)?);

        Ok(Self::assemble(entities, log, git, config.clone()))
    }

    /// Builds a service over in-memory stores and a temporary-path
    /// workspace, for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if a store or the repository cannot be opened.
    pub fn open_in_memory(repo_path: &Path) -> Result<Self> {
        let workspace = GitWorkspace::init_if_needed(repo_path)?;
        let git = Arc::new(Mutex::new(workspace));
        let entities = Arc::new(EntityStore::in_memory()?);
        let log = Arc::new(SyncLogStore::in_memory()?);
        let config = VaultConfig::new(repo_path, ":memory:");

        Ok(Self::assemble(entities, log, git, config))
    }

    fn assemble(
        entities: Arc<EntityStore>,
        log: Arc<SyncLogStore>,
        git: Arc<Mutex<GitWorkspace>>,
        config: VaultConfig,
    ) -> Self {
        let engines: Vec<Arc<SyncEngine>> = EntityKind::all()
            .iter()
            .map(|kind| {
                Arc::new(SyncEngine::new(
                    adapter_for(*kind),
                    Arc::clone(&entities),
                    Arc::clone(&log),
                    Arc::clone(&git),
                    config.repo_path.clone(),
                ))
            })
            .collect();

        let health = HealthService::new(
            Arc::clone(&entities),
            Arc::clone(&log),
            config.failure_window_secs(),
            config.stuck_threshold_secs(),
        );

        Self {
            entities,
            log,
            git,
            engines,
            health,
            config,
        }
    }

    fn engine(&self, kind: EntityKind) -> &SyncEngine {
        // Engines are built in EntityKind::all() order by assemble().
        let idx = EntityKind::all()
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(0);
        &self.engines[idx]
    }

    /// The entity store.
    #[must_use]
    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    /// The service configuration.
    #[must_use]
    pub const fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Creates an entity: database insert first, then git mirroring.
    ///
    /// The slug is derived from the title (with collision
    /// disambiguation) before the insert so the uniqueness constraint
    /// sees the final value. Returns the stored record, whose sync fields
    /// reflect the mirror attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails, or if mirroring fails after
    /// a successful insert. In the latter case the row exists and is
    /// marked `failed`.
    pub fn create(
        &self,
        mut entity: EntityRecord,
        author: &CommitAuthor,
        synced_by: &str,
    ) -> Result<EntityRecord> {
        let engine = self.engine(entity.kind);
        entity.slug = engine.resolve_slug(&entity)?;
        self.insert_with_collision_retry(&mut entity)?;

        engine.save_and_commit(&entity, author, synced_by)?;
        self.refreshed(entity)
    }

    /// Inserts a row, retrying once with a disambiguated slug if another
    /// writer claimed the slug between the availability check and the
    /// insert. The `UNIQUE (kind, slug)` constraint is the arbiter.
    fn insert_with_collision_retry(&self, entity: &mut EntityRecord) -> Result<()> {
        match self.entities.insert(entity) {
            Ok(()) => Ok(()),
            Err(err) if is_slug_conflict(&err) => {
                entity.slug = slug::disambiguate(&entity.slug, &entity.id);
                self.entities.insert(entity)
            }
            Err(err) => Err(err),
        }
    }

    /// Updates an entity: database update first, then git mirroring.
    /// A title change renames the mirror file in the same commit as the
    /// content change.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entity does not exist, or an
    /// error if mirroring fails after a successful update.
    pub fn update(
        &self,
        mut entity: EntityRecord,
        author: &CommitAuthor,
        synced_by: &str,
    ) -> Result<EntityRecord> {
        let existing = self
            .entities
            .get(&entity.id)?
            .ok_or_else(|| Error::NotFound(format!("entity {}", entity.id)))?;

        entity.slug = existing.slug.clone();
        // A replayed no-op must stay byte-identical in the mirror, so the
        // timestamp only moves when something actually changed.
        let changed = entity.title != existing.title
            || entity.body != existing.body
            || entity.categories != existing.categories
            || entity.owner != existing.owner
            || entity.source_ref != existing.source_ref
            || entity.review_status != existing.review_status;
        entity.updated_at = if changed {
            current_timestamp()
        } else {
            existing.updated_at
        };
        self.entities.update(&entity)?;

        let engine = self.engine(entity.kind);
        engine.update_and_commit(&existing.slug, &entity, author, synced_by)?;
        self.refreshed(entity)
    }

    /// Deletes an entity: database delete first, then mirror removal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entity does not exist, or an
    /// error if the mirror removal fails after the row is gone (the
    /// reconciler cannot replay deletes, so the failure is surfaced for
    /// the operator).
    pub fn delete(&self, id: &str, author: &CommitAuthor, synced_by: &str) -> Result<()> {
        let entity = self
            .entities
            .get(id)?
            .ok_or_else(|| Error::NotFound(format!("entity {id}")))?;

        if !self.entities.delete(id)? {
            return Err(Error::NotFound(format!("entity {id}")));
        }

        self.engine(entity.kind)
            .delete_and_commit(&entity, author, synced_by)?;
        Ok(())
    }

    /// Fetches an entity by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: &str) -> Result<Option<EntityRecord>> {
        self.entities.get(id)
    }

    /// Lists entities of a kind in slug order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self, kind: EntityKind) -> Result<Vec<EntityRecord>> {
        self.entities.list(kind)
    }

    /// Lists sync log rows for an entity, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn sync_logs_for(
        &self,
        kind: EntityKind,
        entity_id: &str,
        limit: usize,
    ) -> Result<Vec<SyncLogEntry>> {
        self.log.list_for_entity(kind, entity_id, limit)
    }

    /// Assembles the health report across all kinds. Never fails; store
    /// errors degrade the report.
    #[must_use]
    pub fn health(&self) -> SyncHealthReport {
        self.health.report()
    }

    /// Replays out-of-sync entities. With `force`, every entity is
    /// replayed regardless of cached status.
    #[must_use]
    pub fn trigger_sync(&self, force: bool) -> SyncReport {
        Reconciler::new(self.engines.clone()).run(force)
    }

    /// Returns the commits that touched an entity's mirror file, newest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entity does not exist.
    pub fn history(&self, id: &str, limit: usize) -> Result<Vec<CommitInfo>> {
        let (engine, entity) = self.locate(id)?;
        let rel = engine.files().relative_path(&entity.slug)?;
        let git = crate::storage::sqlite::acquire_lock(&self.git);
        git.history(&rel, limit)
    }

    /// Returns the diff of an entity's mirror file between two commits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entity does not exist, or an
    /// error if either commit cannot be resolved.
    pub fn diff(&self, id: &str, from_commit: &str, to_commit: &str) -> Result<String> {
        let (engine, entity) = self.locate(id)?;
        let rel = engine.files().relative_path(&entity.slug)?;
        let git = crate::storage::sqlite::acquire_lock(&self.git);
        git.diff(&rel, from_commit, to_commit)
    }

    /// Pushes the mirror branch to the configured remote.
    ///
    /// # Errors
    ///
    /// Returns an error if no remote is configured or the push fails.
    pub fn push(&self) -> Result<()> {
        let remote = self
            .config
            .remote
            .as_deref()
            .ok_or_else(|| Error::InvalidInput("no push remote configured".to_string()))?;
        let git = crate::storage::sqlite::acquire_lock(&self.git);
        let branch = match &self.config.branch {
            Some(branch) => branch.clone(),
            None => git.current_branch()?,
        };
        git.push(remote, &branch)
    }

    /// Returns true if the mirror working tree has no uncommitted changes.
    ///
    /// # Errors
    ///
    /// Returns an error if status inspection fails.
    pub fn mirror_is_clean(&self) -> Result<bool> {
        let git = crate::storage::sqlite::acquire_lock(&self.git);
        git.is_clean()
    }

    fn locate(&self, id: &str) -> Result<(&SyncEngine, EntityRecord)> {
        let entity = self
            .entities
            .get(id)?
            .ok_or_else(|| Error::NotFound(format!("entity {id}")))?;
        Ok((self.engine(entity.kind), entity))
    }

    /// Re-reads an entity so the caller sees the post-sync row; falls back
    /// to the in-memory copy if the row vanished meanwhile.
    fn refreshed(&self, entity: EntityRecord) -> Result<EntityRecord> {
        Ok(self.entities.get(&entity.id)?.unwrap_or(entity))
    }
}

fn is_slug_conflict(err: &Error) -> bool {
    matches!(err, Error::OperationFailed { cause, .. } if cause.contains("UNIQUE constraint failed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncStatus;
    use tempfile::TempDir;

    fn service() -> (TempDir, SyncService) {
        let dir = TempDir::new().unwrap();
        let service = SyncService::open_in_memory(dir.path()).unwrap();
        (dir, service)
    }

    fn author() -> CommitAuthor {
        CommitAuthor::new("Jane Doe", "jane@example.com")
    }

    #[test]
    fn test_create_derives_slug_and_mirrors() {
        let (dir, service) = service();
        let entity = EntityRecord::new(EntityKind::Skill, "Access Management", "Body.");

        let stored = service.create(entity, &author(), "jdoe").unwrap();
        assert_eq!(stored.slug, "access-management");
        assert_eq!(stored.sync_status, SyncStatus::Synced);
        assert!(stored.git_commit_sha.is_some());
        assert!(dir.path().join("skills/access-management.md").exists());
    }

    #[test]
    fn test_create_collision_gets_distinct_slug() {
        let (_dir, service) = service();
        let first = service
            .create(
                EntityRecord::new(EntityKind::Skill, "Same Title", "a"),
                &author(),
                "jdoe",
            )
            .unwrap();
        let second = service
            .create(
                EntityRecord::new(EntityKind::Skill, "Same Title", "b"),
                &author(),
                "jdoe",
            )
            .unwrap();

        assert_eq!(first.slug, "same-title");
        assert_ne!(second.slug, first.slug);
    }

    #[test]
    fn test_insert_retries_after_losing_slug_race() {
        let (_dir, service) = service();
        // Another writer claims the slug after the availability check
        // would have reported it free.
        let mut holder = EntityRecord::new(EntityKind::Skill, "Same Title", "a");
        holder.slug = "same-title".to_string();
        service.entities().insert(&holder).unwrap();

        let mut loser = EntityRecord::new(EntityKind::Skill, "Same Title", "b");
        loser.slug = "same-title".to_string();
        service.insert_with_collision_retry(&mut loser).unwrap();

        assert!(loser.slug.starts_with("same-title-"));
        assert!(service.get(&loser.id).unwrap().is_some());
    }

    #[test]
    fn test_update_renames_mirror_file() {
        let (dir, service) = service();
        let mut entity = service
            .create(
                EntityRecord::new(EntityKind::Skill, "Access Management", "Body."),
                &author(),
                "jdoe",
            )
            .unwrap();

        entity.title = "Identity & Access Management".to_string();
        let updated = service.update(entity, &author(), "jdoe").unwrap();

        assert_eq!(updated.slug, "identity-and-access-management");
        assert!(!dir.path().join("skills/access-management.md").exists());
        assert!(dir
            .path()
            .join("skills/identity-and-access-management.md")
            .exists());
    }

    #[test]
    fn test_update_missing_entity_is_not_found() {
        let (_dir, service) = service();
        let ghost = EntityRecord::new(EntityKind::Skill, "Ghost", "x");
        assert!(matches!(
            service.update(ghost, &author(), "jdoe"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_removes_row_and_mirror() {
        let (dir, service) = service();
        let entity = service
            .create(
                EntityRecord::new(EntityKind::Skill, "Doomed", "x"),
                &author(),
                "jdoe",
            )
            .unwrap();

        service.delete(&entity.id, &author(), "jdoe").unwrap();
        assert!(service.get(&entity.id).unwrap().is_none());
        assert!(!dir.path().join("skills/doomed.md").exists());

        // The audit trail survives the entity.
        let logs = service
            .sync_logs_for(EntityKind::Skill, &entity.id, 10)
            .unwrap();
        assert_eq!(logs.len(), 2);
    }

    #[test]
    fn test_history_for_entity() {
        let (_dir, service) = service();
        let mut entity = service
            .create(
                EntityRecord::new(EntityKind::Skill, "Tracked", "v1"),
                &author(),
                "jdoe",
            )
            .unwrap();

        entity.body = "v2".to_string();
        service.update(entity.clone(), &author(), "jdoe").unwrap();

        let history = service.history(&entity.id, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message, "Update skill: Tracked");
        assert_eq!(history[1].message, "Add skill: Tracked");
    }

    #[test]
    fn test_diff_between_versions() {
        let (_dir, service) = service();
        let mut entity = service
            .create(
                EntityRecord::new(EntityKind::Skill, "Tracked", "old body"),
                &author(),
                "jdoe",
            )
            .unwrap();

        entity.body = "new body".to_string();
        let updated = service.update(entity, &author(), "jdoe").unwrap();

        let history = service.history(&updated.id, 10).unwrap();
        let diff = service
            .diff(&updated.id, &history[1].sha, &history[0].sha)
            .unwrap();
        assert!(diff.contains("-old body"));
        assert!(diff.contains("+new body"));
    }

    #[test]
    fn test_push_without_remote_is_invalid_input() {
        let (_dir, service) = service();
        assert!(matches!(service.push(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_mirror_clean_after_create() {
        let (_dir, service) = service();
        service
            .create(
                EntityRecord::new(EntityKind::CustomerProfile, "Acme", "Profile."),
                &author(),
                "jdoe",
            )
            .unwrap();
        assert!(service.mirror_is_clean().unwrap());
    }

    #[test]
    fn test_health_and_trigger_sync() {
        let (_dir, service) = service();
        service
            .create(
                EntityRecord::new(EntityKind::Skill, "A", "x"),
                &author(),
                "jdoe",
            )
            .unwrap();

        let report = service.health();
        assert!(report.healthy);
        assert_eq!(report.total_entities(), 1);

        let sync = service.trigger_sync(false);
        assert_eq!(sync.processed, 0);
    }
}
