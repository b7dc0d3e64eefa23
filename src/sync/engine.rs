//! The per-kind sync orchestrator.
//!
//! Sequences slug resolution, mirror file I/O, git staging/commit, and the
//! audit log for one entity kind. Every attempt runs through
//! [`SyncEngine::with_sync_logging`]: a `pending` log row is opened before
//! the attempt and transitions to exactly one terminal state afterwards,
//! whatever happens in between.
//!
//! The database write that triggered a sync has already committed by the
//! time the engine runs. Git mirroring is best-effort with observable
//! failure: an error here marks the entity `failed` and is reported to the
//! caller, but never rolls back or blocks the database mutation.

use super::adapter::EntityAdapter;
use crate::git::{CommitAuthor, GitWorkspace};
use crate::models::{EntityRecord, EntityKind, SyncDirection, SyncOperation};
use crate::storage::sqlite::acquire_lock;
use crate::storage::{EntityStore, FileStore, SyncLogStore};
use crate::{Result, slug};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::instrument;

/// Generic sync orchestrator for one entity kind.
pub struct SyncEngine {
    /// Kind-specific behavior.
    adapter: Box<dyn EntityAdapter>,
    /// Entity rows (cached sync fields live here).
    entities: Arc<EntityStore>,
    /// Append-only audit trail.
    log: Arc<SyncLogStore>,
    /// Mirror files for this kind.
    files: FileStore,
    /// The shared git working copy. One local checkout cannot support two
    /// concurrent commits, so every git-mutating section holds this lock;
    /// the lock also covers the mirror file I/O feeding the index so a
    /// rename can never interleave with another entity's staging.
    git: Arc<Mutex<GitWorkspace>>,
}

impl SyncEngine {
    /// Creates an engine for one entity kind.
    #[must_use]
    pub fn new(
        adapter: Box<dyn EntityAdapter>,
        entities: Arc<EntityStore>,
        log: Arc<SyncLogStore>,
        git: Arc<Mutex<GitWorkspace>>,
        repo_root: impl Into<std::path::PathBuf>,
    ) -> Self {
        let files = FileStore::new(repo_root, adapter.directory());
        Self {
            adapter,
            entities,
            log,
            files,
            git,
        }
    }

    /// The entity kind this engine serves.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.adapter.kind()
    }

    /// The mirror file store for this kind.
    #[must_use]
    pub const fn files(&self) -> &FileStore {
        &self.files
    }

    /// The kind-specific adapter.
    #[must_use]
    pub fn adapter(&self) -> &dyn EntityAdapter {
        self.adapter.as_ref()
    }

    /// The entity store behind this engine.
    #[must_use]
    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    /// Derives the slug for an entity's current title, disambiguating
    /// exact collisions with an id fragment so two distinct entities can
    /// never resolve to the same file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the collision lookup fails.
    pub fn resolve_slug(&self, entity: &EntityRecord) -> Result<String> {
        let derived = slug::slugify(&entity.title);
        if self
            .entities
            .slug_taken(self.kind(), &derived, &entity.id)?
        {
            return Ok(slug::disambiguate(&derived, &entity.id));
        }
        Ok(derived)
    }

    /// Mirrors a newly created entity: write file, stage, commit if
    /// changed.
    ///
    /// Returns the commit id, or `None` when the rendered file equals
    /// what is already committed (a no-op, treated as success) or when
    /// review gating skips the sync entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt failed; the entity is already
    /// marked `failed` and the log row completed by the time it returns.
    #[instrument(skip(self, entity, author), fields(kind = %self.kind(), entity_id = %entity.id))]
    pub fn save_and_commit(
        &self,
        entity: &EntityRecord,
        author: &CommitAuthor,
        synced_by: &str,
    ) -> Result<Option<String>> {
        if !self.adapter.is_publishable(entity) {
            tracing::debug!("entity is draft, skipping git sync");
            return Ok(None);
        }

        let message = self
            .adapter
            .commit_message(SyncOperation::Create, &entity.title);

        self.with_sync_logging(
            &entity.id,
            Some(&entity.id),
            SyncOperation::Create,
            synced_by,
            || self.write_and_commit(entity, &entity.slug, &message, author),
        )
    }

    /// Mirrors an updated entity. When the title change produced a new
    /// slug, the removal of the old path and the presence of the new path
    /// are staged before content is written, so the rename and the content
    /// change land in one commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt failed (see [`Self::save_and_commit`]).
    #[instrument(skip(self, entity, author), fields(kind = %self.kind(), entity_id = %entity.id))]
    pub fn update_and_commit(
        &self,
        old_slug: &str,
        entity: &EntityRecord,
        author: &CommitAuthor,
        synced_by: &str,
    ) -> Result<Option<String>> {
        if !self.adapter.is_publishable(entity) {
            tracing::debug!("entity is draft, skipping git sync");
            return Ok(None);
        }

        let message = self
            .adapter
            .commit_message(SyncOperation::Update, &entity.title);

        self.with_sync_logging(
            &entity.id,
            Some(&entity.id),
            SyncOperation::Update,
            synced_by,
            || {
                let new_slug = self.resolve_slug(entity)?;

                if new_slug == old_slug {
                    return self.write_and_commit(entity, old_slug, &message, author);
                }

                let git = acquire_lock(&self.git);
                let old_rel = self.files.relative_path(old_slug)?;
                let new_rel = self.files.relative_path(&new_slug)?;

                if self.files.exists(old_slug)? {
                    self.files.rename(old_slug, &new_slug)?;
                    git.remove(&old_rel)?;
                }
                self.entities.update_slug(&entity.id, &new_slug)?;

                let content = self.adapter.to_file_representation(entity)?;
                self.files.write(&new_slug, &content)?;
                git.add(&[new_rel.as_path()])?;
                git.commit_staged_if_any(&message, author)
            },
        )
    }

    /// Removes an entity's mirror file and commits the deletion.
    ///
    /// Called after the database row is gone, so the entity's cached sync
    /// fields are not updated; only the log records the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt failed.
    #[instrument(skip(self, entity, author), fields(kind = %self.kind(), entity_id = %entity.id))]
    pub fn delete_and_commit(
        &self,
        entity: &EntityRecord,
        author: &CommitAuthor,
        synced_by: &str,
    ) -> Result<Option<String>> {
        let message = self
            .adapter
            .commit_message(SyncOperation::Delete, &entity.title);
        let entity_slug = entity.slug.clone();

        self.with_sync_logging(
            &entity.id,
            None,
            SyncOperation::Delete,
            synced_by,
            || {
                let rel = self.files.relative_path(&entity_slug)?;
                let git = acquire_lock(&self.git);

                if !self.files.delete(&entity_slug)? {
                    // Never mirrored; nothing to commit.
                    return Ok(None);
                }
                git.remove(&rel)?;
                git.commit_staged_if_any(&message, author)
            },
        )
    }

    /// Write file, stage, commit-if-changed, under the workspace lock.
    fn write_and_commit(
        &self,
        entity: &EntityRecord,
        entity_slug: &str,
        message: &str,
        author: &CommitAuthor,
    ) -> Result<Option<String>> {
        let content = self.adapter.to_file_representation(entity)?;
        let rel = self.files.relative_path(entity_slug)?;

        let git = acquire_lock(&self.git);
        self.files.write(entity_slug, &content)?;
        git.add(&[rel.as_path()])?;
        git.commit_staged_if_any(message, author)
    }

    /// Runs a sync attempt inside the audit logging envelope.
    ///
    /// Exactly one log row is opened per call and transitions to exactly
    /// one terminal state. Failures of the log store itself are reported
    /// through application logging rather than thrown; a log-store outage
    /// must not also take down the entity mutation. The sync error, by
    /// contrast, is always re-raised after being recorded.
    fn with_sync_logging<F>(
        &self,
        entity_id: &str,
        entity_uuid: Option<&str>,
        operation: SyncOperation,
        synced_by: &str,
        sync_fn: F,
    ) -> Result<Option<String>>
    where
        F: FnOnce() -> Result<Option<String>>,
    {
        let kind = self.kind();
        let start = Instant::now();

        let log_id = match self.log.begin(
            kind,
            entity_id,
            operation,
            SyncDirection::DbToGit,
            synced_by,
        ) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(error = %e, %kind, entity_id, "failed to open sync log row");
                None
            },
        };

        if let Some(uuid) = entity_uuid {
            if let Err(e) = self.entities.mark_sync_pending(uuid) {
                tracing::warn!(error = %e, entity_id, "failed to mark entity pending");
            }
        }

        let result = sync_fn();

        match &result {
            Ok(sha) => {
                if let Some(id) = &log_id {
                    if let Err(e) = self.log.complete_success(id, sha.as_deref()) {
                        tracing::error!(error = %e, log_id = %id, "failed to complete sync log row");
                    }
                }
                if let Some(uuid) = entity_uuid {
                    if let Err(e) = self.entities.record_sync_success(
                        uuid,
                        sha.as_deref(),
                        crate::current_timestamp(),
                    ) {
                        tracing::warn!(error = %e, entity_id, "failed to record sync success");
                    }
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, %kind, entity_id, "sync attempt failed");
                if let Some(id) = &log_id {
                    if let Err(log_err) = self.log.complete_failure(id, &e.to_string()) {
                        tracing::error!(error = %log_err, log_id = %id, "failed to complete sync log row");
                    }
                }
                if let Some(uuid) = entity_uuid {
                    if let Err(db_err) = self.entities.record_sync_failure(uuid) {
                        tracing::warn!(error = %db_err, entity_id, "failed to record sync failure");
                    }
                }
            },
        }

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::counter!(
            "entity_sync_total",
            "kind" => kind.as_str(),
            "operation" => operation.as_str(),
            "status" => status
        )
        .increment(1);
        metrics::histogram!("entity_sync_duration_ms", "kind" => kind.as_str())
            .record(start.elapsed().as_secs_f64() * 1000.0);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReviewStatus, SyncLogStatus, SyncStatus};
    use crate::sync::adapter::SkillAdapter;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        engine: SyncEngine,
        entities: Arc<EntityStore>,
        log: Arc<SyncLogStore>,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let workspace = GitWorkspace::init_if_needed(dir.path()).unwrap();
        let entities = Arc::new(EntityStore::in_memory().unwrap());
        let log = Arc::new(SyncLogStore::in_memory().unwrap());
        let engine = SyncEngine::new(
            Box::new(SkillAdapter),
            Arc::clone(&entities),
            Arc::clone(&log),
            Arc::new(Mutex::new(workspace)),
            dir.path(),
        );
        Harness {
            _dir: dir,
            engine,
            entities,
            log,
        }
    }

    fn broken_harness() -> Harness {
        // Points the git workspace at a directory that is not a repository,
        // so every commit attempt fails while the database stays healthy.
        let dir = TempDir::new().unwrap();
        let workspace = GitWorkspace::new(dir.path().join("missing"));
        let entities = Arc::new(EntityStore::in_memory().unwrap());
        let log = Arc::new(SyncLogStore::in_memory().unwrap());
        let engine = SyncEngine::new(
            Box::new(SkillAdapter),
            Arc::clone(&entities),
            Arc::clone(&log),
            Arc::new(Mutex::new(workspace)),
            dir.path(),
        );
        Harness {
            _dir: dir,
            engine,
            entities,
            log,
        }
    }

    fn author() -> CommitAuthor {
        CommitAuthor::new("Jane Doe", "jane@example.com")
    }

    fn insert_skill(h: &Harness, title: &str) -> EntityRecord {
        let mut entity = EntityRecord::new(EntityKind::Skill, title, "The body.");
        entity.slug = h.engine.resolve_slug(&entity).unwrap();
        h.entities.insert(&entity).unwrap();
        entity
    }

    #[test]
    fn test_save_creates_file_and_commit() {
        let h = harness();
        let entity = insert_skill(&h, "Access Management");

        let sha = h.engine.save_and_commit(&entity, &author(), "jdoe").unwrap();
        assert!(sha.is_some());

        assert!(h.engine.files().exists("access-management").unwrap());
        let row = h.entities.get(&entity.id).unwrap().unwrap();
        assert_eq!(row.sync_status, SyncStatus::Synced);
        assert_eq!(row.git_commit_sha, sha);
        assert!(row.last_synced_at.is_some());

        let logs = h.log.list_for_entity(EntityKind::Skill, &entity.id, 10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, SyncLogStatus::Success);
        assert_eq!(logs[0].git_commit_sha, sha);
        assert_eq!(logs[0].synced_by, "jdoe");
    }

    #[test]
    fn test_second_identical_save_is_noop() {
        let h = harness();
        let entity = insert_skill(&h, "Access Management");

        let first = h.engine.save_and_commit(&entity, &author(), "jdoe").unwrap();
        let second = h.engine.save_and_commit(&entity, &author(), "jdoe").unwrap();
        assert!(first.is_some());
        assert!(second.is_none());

        // Still synced, still pointing at the first commit.
        let row = h.entities.get(&entity.id).unwrap().unwrap();
        assert_eq!(row.sync_status, SyncStatus::Synced);
        assert_eq!(row.git_commit_sha, first);

        // Both attempts are on the audit trail; the no-op carries no SHA.
        let logs = h.log.list_for_entity(EntityKind::Skill, &entity.id, 10).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].status, SyncLogStatus::Success);
        assert!(logs[0].git_commit_sha.is_none());
    }

    #[test]
    fn test_rename_lands_in_single_commit() {
        let h = harness();
        let mut entity = insert_skill(&h, "Access Management");
        h.engine.save_and_commit(&entity, &author(), "jdoe").unwrap();

        entity.title = "Identity & Access Management".to_string();
        entity.body = "Expanded body.".to_string();
        h.entities.update(&entity).unwrap();

        let sha = h
            .engine
            .update_and_commit("access-management", &entity, &author(), "jdoe")
            .unwrap();
        assert!(sha.is_some());

        assert!(!h.engine.files().exists("access-management").unwrap());
        assert!(h.engine.files().exists("identity-and-access-management").unwrap());

        // The database slug followed the rename.
        let row = h.entities.get(&entity.id).unwrap().unwrap();
        assert_eq!(row.slug, "identity-and-access-management");
        assert_eq!(row.git_commit_sha, sha);
    }

    #[test]
    fn test_update_without_rename() {
        let h = harness();
        let mut entity = insert_skill(&h, "Access Management");
        h.engine.save_and_commit(&entity, &author(), "jdoe").unwrap();

        entity.body = "New body.".to_string();
        h.entities.update(&entity).unwrap();

        let sha = h
            .engine
            .update_and_commit("access-management", &entity, &author(), "jdoe")
            .unwrap();
        assert!(sha.is_some());

        let content = h.engine.files().read("access-management").unwrap().unwrap();
        assert!(content.contains("New body."));
    }

    #[test]
    fn test_draft_skips_git_entirely() {
        let h = harness();
        let mut entity = EntityRecord::new(EntityKind::Skill, "Draft Skill", "wip")
            .with_review_status(ReviewStatus::Draft);
        entity.slug = "draft-skill".to_string();
        h.entities.insert(&entity).unwrap();

        let sha = h.engine.save_and_commit(&entity, &author(), "jdoe").unwrap();
        assert!(sha.is_none());

        // No file, no log row, status untouched.
        assert!(!h.engine.files().exists("draft-skill").unwrap());
        let logs = h.log.list_for_entity(EntityKind::Skill, &entity.id, 10).unwrap();
        assert!(logs.is_empty());
        let row = h.entities.get(&entity.id).unwrap().unwrap();
        assert_eq!(row.sync_status, SyncStatus::Unknown);
    }

    #[test]
    fn test_git_failure_marks_failed_and_keeps_db_row() {
        let h = broken_harness();
        let entity = insert_skill(&h, "Access Management");

        let result = h.engine.save_and_commit(&entity, &author(), "jdoe");
        assert!(result.is_err());

        // The database row is intact and readable; only the sync state
        // and the log reflect the failure.
        let row = h.entities.get(&entity.id).unwrap().unwrap();
        assert_eq!(row.title, "Access Management");
        assert_eq!(row.sync_status, SyncStatus::Failed);
        assert!(row.git_commit_sha.is_none());

        let logs = h.log.list_for_entity(EntityKind::Skill, &entity.id, 10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, SyncLogStatus::Failed);
        assert!(logs[0].error.as_deref().is_some_and(|e| !e.is_empty()));
    }

    #[test]
    fn test_delete_commits_removal() {
        let h = harness();
        let entity = insert_skill(&h, "Access Management");
        h.engine.save_and_commit(&entity, &author(), "jdoe").unwrap();
        h.entities.delete(&entity.id).unwrap();

        let sha = h.engine.delete_and_commit(&entity, &author(), "jdoe").unwrap();
        assert!(sha.is_some());
        assert!(!h.engine.files().exists("access-management").unwrap());

        let logs = h.log.list_for_entity(EntityKind::Skill, &entity.id, 10).unwrap();
        assert_eq!(logs[0].operation, SyncOperation::Delete);
        assert_eq!(logs[0].status, SyncLogStatus::Success);
    }

    #[test]
    fn test_delete_of_unmirrored_entity_is_noop() {
        let h = harness();
        let mut entity = EntityRecord::new(EntityKind::Skill, "Never Synced", "x");
        entity.slug = "never-synced".to_string();

        let sha = h.engine.delete_and_commit(&entity, &author(), "jdoe").unwrap();
        assert!(sha.is_none());
    }

    #[test]
    fn test_slug_collision_disambiguated() {
        let h = harness();
        let first = insert_skill(&h, "Access Management");
        assert_eq!(first.slug, "access-management");

        let second = EntityRecord::new(EntityKind::Skill, "Access Management", "other");
        let slug = h.engine.resolve_slug(&second).unwrap();
        assert_ne!(slug, first.slug);
        assert!(slug.starts_with("access-management-"));
    }
}
