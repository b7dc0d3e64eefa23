//! End-to-end tests of the dual-write path: database mutation, mirror
//! file, git commit, audit log, and health, exercised through the
//! service facade the way an application would.

use std::path::Path;
use tempfile::TempDir;
use vaultsync::{
    CommitAuthor, EntityKind, EntityRecord, ReviewStatus, SyncService, SyncStatus,
    models::SyncLogStatus, models::SyncOperation,
};

fn service() -> (TempDir, SyncService) {
    let dir = TempDir::new().unwrap();
    let service = SyncService::open_in_memory(dir.path()).unwrap();
    (dir, service)
}

fn author() -> CommitAuthor {
    CommitAuthor::new("Jane Doe", "jane@example.com")
}

#[test]
fn create_mirrors_skill_with_front_matter() {
    let (dir, service) = service();

    let entity = EntityRecord::new(
        EntityKind::Skill,
        "Access Management",
        "Grant least privilege.\n",
    )
    .with_categories(vec!["iam".to_string()]);

    let stored = service.create(entity, &author(), "jdoe").unwrap();
    assert_eq!(stored.slug, "access-management");
    assert_eq!(stored.sync_status, SyncStatus::Synced);
    let sha = stored.git_commit_sha.clone().unwrap();

    let path = dir.path().join("skills/access-management.md");
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("---\n"));
    assert!(content.contains(&format!("id: {}", stored.id)));
    assert!(content.contains("kind: skill"));
    assert!(content.contains("title: Access Management"));
    assert!(content.contains("Grant least privilege."));

    // The commit message names the operation and the title.
    let history = service.history(&stored.id, 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sha, sha);
    assert_eq!(history[0].message, "Add skill: Access Management");
    assert_eq!(history[0].author, "Jane Doe");
}

#[test]
fn rename_moves_file_and_keeps_identity() {
    let (dir, service) = service();

    let mut entity = service
        .create(
            EntityRecord::new(EntityKind::Skill, "Access Management", "Body.\n"),
            &author(),
            "jdoe",
        )
        .unwrap();

    entity.title = "Identity & Access Management".to_string();
    entity.body = "Updated body.\n".to_string();
    let updated = service.update(entity, &author(), "jdoe").unwrap();

    // One new slug, old path gone, id unchanged.
    assert_eq!(updated.slug, "identity-and-access-management");
    assert!(!dir.path().join("skills/access-management.md").exists());
    assert!(dir
        .path()
        .join("skills/identity-and-access-management.md")
        .exists());

    // The rename and the content change landed in a single commit.
    // History follows the current path, which first appears there.
    let history = service.history(&updated.id, 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].message,
        "Update skill: Identity & Access Management"
    );

    // Nothing left uncommitted.
    assert!(service.mirror_is_clean().unwrap());
}

#[test]
fn identical_update_produces_no_commit() {
    let (_dir, service) = service();

    let entity = service
        .create(
            EntityRecord::new(EntityKind::CustomerProfile, "Acme Corp", "Profile.\n"),
            &author(),
            "jdoe",
        )
        .unwrap();
    let first_sha = entity.git_commit_sha.clone().unwrap();

    // Replaying the same content must not grow history or clear the SHA.
    let replayed = service.update(entity.clone(), &author(), "jdoe").unwrap();
    assert_eq!(replayed.git_commit_sha.as_deref(), Some(first_sha.as_str()));
    assert_eq!(replayed.sync_status, SyncStatus::Synced);

    let history = service.history(&entity.id, 10).unwrap();
    assert_eq!(history.len(), 1);

    // Both attempts are in the log; the second succeeded without a SHA.
    let logs = service
        .sync_logs_for(EntityKind::CustomerProfile, &entity.id, 10)
        .unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].status, SyncLogStatus::Success);
    assert!(logs[0].git_commit_sha.is_none());
    assert_eq!(logs[1].git_commit_sha.as_deref(), Some(first_sha.as_str()));
}

#[test]
fn draft_skill_stays_out_of_mirror_until_published() {
    let (dir, service) = service();

    let entity = EntityRecord::new(EntityKind::Skill, "Secret Draft", "wip\n")
        .with_review_status(ReviewStatus::Draft);
    let stored = service.create(entity, &author(), "jdoe").unwrap();

    // Row exists, mirror does not, and no sync attempt was logged.
    assert!(service.get(&stored.id).unwrap().is_some());
    assert!(!dir.path().join("skills/secret-draft.md").exists());
    assert!(service
        .sync_logs_for(EntityKind::Skill, &stored.id, 10)
        .unwrap()
        .is_empty());
    assert_eq!(stored.sync_status, SyncStatus::Unknown);

    // Publishing mirrors it.
    let mut publish = stored.clone();
    publish.review_status = ReviewStatus::Published;
    let published = service.update(publish, &author(), "jdoe").unwrap();
    assert_eq!(published.sync_status, SyncStatus::Synced);
    assert!(dir.path().join("skills/secret-draft.md").exists());
}

#[test]
fn customer_profiles_are_not_gated() {
    let (dir, service) = service();

    let entity = EntityRecord::new(EntityKind::CustomerProfile, "Acme Corp", "Profile.\n")
        .with_review_status(ReviewStatus::Draft);
    let stored = service.create(entity, &author(), "jdoe").unwrap();

    assert_eq!(stored.sync_status, SyncStatus::Synced);
    assert!(dir.path().join("customers/acme-corp.md").exists());
}

#[test]
fn slug_collisions_resolve_to_distinct_paths() {
    let (dir, service) = service();

    let first = service
        .create(
            EntityRecord::new(EntityKind::PromptBlock, "Greeting", "Hi.\n"),
            &author(),
            "jdoe",
        )
        .unwrap();
    let second = service
        .create(
            EntityRecord::new(EntityKind::PromptBlock, "Greeting", "Hello.\n"),
            &author(),
            "jdoe",
        )
        .unwrap();

    assert_eq!(first.slug, "greeting");
    assert_ne!(second.slug, first.slug);
    assert!(dir
        .path()
        .join(format!("prompt-blocks/{}.md", second.slug))
        .exists());

    // Same title on a different kind does not collide.
    let modifier = service
        .create(
            EntityRecord::new(EntityKind::PromptModifier, "Greeting", "Hey.\n"),
            &author(),
            "jdoe",
        )
        .unwrap();
    assert_eq!(modifier.slug, "greeting");
}

#[test]
fn git_failure_keeps_database_row_and_records_failure() {
    let dir = TempDir::new().unwrap();
    let service = SyncService::open_in_memory(dir.path()).unwrap();

    // Break the repository after the service opened it.
    std::fs::remove_dir_all(dir.path().join(".git")).unwrap();

    let entity = EntityRecord::new(EntityKind::Skill, "Doomed", "x\n");
    let result = service.create(entity, &author(), "jdoe");
    assert!(result.is_err());

    // The database insert survived the git failure.
    let rows = service.list(EntityKind::Skill).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title, "Doomed");
    assert_eq!(rows[0].sync_status, SyncStatus::Failed);

    // The log row reached its failed terminal state with an error message.
    let logs = service
        .sync_logs_for(EntityKind::Skill, &rows[0].id, 10)
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, SyncLogStatus::Failed);
    assert!(logs[0].error.is_some());
    assert_eq!(logs[0].operation, SyncOperation::Create);
}

#[test]
fn reconciler_replays_failed_entities() {
    let dir = TempDir::new().unwrap();
    let service = SyncService::open_in_memory(dir.path()).unwrap();

    // First attempt fails against a broken repository.
    let git_dir = dir.path().join(".git");
    let parked = dir.path().join(".git-parked");
    std::fs::rename(&git_dir, &parked).unwrap();
    let failed = service.create(EntityRecord::new(EntityKind::Skill, "Flaky", "x\n"), &author(), "jdoe");
    assert!(failed.is_err());

    // Repository comes back; reconciliation converges the mirror.
    std::fs::rename(&parked, &git_dir).unwrap();
    let report = service.trigger_sync(false);
    assert_eq!(report.processed, 1);
    assert_eq!(report.committed, 1);
    assert!(report.is_clean());

    let rows = service.list(EntityKind::Skill).unwrap();
    assert_eq!(rows[0].sync_status, SyncStatus::Synced);
    assert!(rows[0].git_commit_sha.is_some());
    assert!(dir.path().join("skills/flaky.md").exists());

    // A second run finds nothing to do.
    let again = service.trigger_sync(false);
    assert_eq!(again.processed, 0);
}

#[test]
fn delete_commits_removal_and_log_outlives_row() {
    let (dir, service) = service();

    let entity = service
        .create(
            EntityRecord::new(EntityKind::PromptModifier, "Tone Softener", "Be nice.\n"),
            &author(),
            "jdoe",
        )
        .unwrap();
    let path = dir.path().join("prompt-modifiers/tone-softener.md");
    assert!(path.exists());

    service.delete(&entity.id, &author(), "jdoe").unwrap();
    assert!(!path.exists());
    assert!(service.get(&entity.id).unwrap().is_none());

    let logs = service
        .sync_logs_for(EntityKind::PromptModifier, &entity.id, 10)
        .unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].operation, SyncOperation::Delete);
    assert_eq!(logs[0].status, SyncLogStatus::Success);
    assert!(logs[0].git_commit_sha.is_some());
}

#[test]
fn health_reflects_failures_and_recovers() {
    let dir = TempDir::new().unwrap();
    let service = SyncService::open_in_memory(dir.path()).unwrap();

    assert!(service.health().healthy);

    let git_dir = dir.path().join(".git");
    let parked = dir.path().join(".git-parked");
    std::fs::rename(&git_dir, &parked).unwrap();
    let _ = service.create(EntityRecord::new(EntityKind::Skill, "Bad", "x\n"), &author(), "jdoe");

    let degraded = service.health();
    assert!(!degraded.healthy);
    let skills = degraded
        .kinds
        .iter()
        .find(|k| k.kind == EntityKind::Skill)
        .unwrap();
    assert_eq!(skills.failed, 1);
    assert_eq!(skills.recent_failures, 1);

    // Recovery clears the per-entity failure; the recent-failure count
    // stays inside its window, so health reports the incident until it
    // ages out.
    std::fs::rename(&parked, &git_dir).unwrap();
    let report = service.trigger_sync(false);
    assert_eq!(report.committed, 1);

    let recovered = service.health();
    let skills = recovered
        .kinds
        .iter()
        .find(|k| k.kind == EntityKind::Skill)
        .unwrap();
    assert_eq!(skills.failed, 0);
    assert_eq!(skills.synced, 1);
}

#[test]
fn diff_shows_content_change() {
    let (_dir, service) = service();

    let mut entity = service
        .create(
            EntityRecord::new(EntityKind::Skill, "Evolving", "first version\n"),
            &author(),
            "jdoe",
        )
        .unwrap();

    entity.body = "second version\n".to_string();
    let updated = service.update(entity, &author(), "jdoe").unwrap();

    let history = service.history(&updated.id, 10).unwrap();
    assert_eq!(history.len(), 2);
    let diff = service
        .diff(&updated.id, &history[1].sha, &history[0].sha)
        .unwrap();
    assert!(diff.contains("-first version"));
    assert!(diff.contains("+second version"));
}

#[test]
fn unicode_titles_produce_ascii_slugs() {
    let (dir, service) = service();

    let stored = service
        .create(
            EntityRecord::new(EntityKind::Skill, "Café Überwachung", "x\n"),
            &author(),
            "jdoe",
        )
        .unwrap();

    assert_eq!(stored.slug, "cafe-uberwachung");
    assert!(dir.path().join("skills/cafe-uberwachung.md").exists());
    assert!(!Path::new(&stored.slug).is_absolute());
}

#[test]
fn persistent_database_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("vaultsync.db");
    let config = vaultsync::VaultConfig::new(dir.path().join("mirror"), &db_path);

    let id = {
        let service = SyncService::open(&config).unwrap();
        let stored = service
            .create(
                EntityRecord::new(EntityKind::Skill, "Durable", "x\n"),
                &author(),
                "jdoe",
            )
            .unwrap();
        stored.id
    };

    // A fresh service over the same paths sees the row and its sync state.
    let service = SyncService::open(&config).unwrap();
    let row = service.get(&id).unwrap().unwrap();
    assert_eq!(row.title, "Durable");
    assert_eq!(row.sync_status, SyncStatus::Synced);
    assert!(service
        .sync_logs_for(EntityKind::Skill, &id, 10)
        .unwrap()
        .first()
        .is_some_and(|log| log.status == SyncLogStatus::Success));
}
