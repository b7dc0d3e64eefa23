//! Drift repair between the database and the git mirror.
//!
//! The database is the source of truth; the reconciler walks it and
//! replays any entity whose cached status says the mirror may be behind
//! (failed attempts, interrupted processes, rows never synced). Because
//! every replayed write goes through the engine's commit-only-if-changed
//! path, reconciliation is idempotent: a second run over a converged
//! mirror produces no commits.

use super::engine::SyncEngine;
use crate::git::CommitAuthor;
use crate::models::EntityKind;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Entities examined.
    pub processed: u64,
    /// Entities whose replay produced a commit.
    pub committed: u64,
    /// Entities already in sync (replay was a no-op).
    pub unchanged: u64,
    /// Entities skipped by review gating.
    pub skipped_draft: u64,
    /// Entities whose replay failed.
    pub failed: u64,
    /// One message per failure, for operator display.
    pub warnings: Vec<String>,
}

impl SyncReport {
    /// Merges another report into this one.
    pub fn absorb(&mut self, other: SyncReport) {
        self.processed += other.processed;
        self.committed += other.committed;
        self.unchanged += other.unchanged;
        self.skipped_draft += other.skipped_draft;
        self.failed += other.failed;
        self.warnings.extend(other.warnings);
    }

    /// True when no entity failed to replay.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Replays out-of-sync entities through the per-kind engines.
pub struct Reconciler {
    engines: Vec<Arc<SyncEngine>>,
}

impl Reconciler {
    /// Creates a reconciler over the given engines.
    #[must_use]
    pub fn new(engines: Vec<Arc<SyncEngine>>) -> Self {
        Self { engines }
    }

    /// Reconciles every kind. With `force`, all entities are replayed
    /// regardless of cached status; otherwise only rows not marked
    /// `synced` are examined.
    ///
    /// Failures are per-entity: one bad row is recorded in the report and
    /// the run continues.
    #[instrument(skip(self))]
    pub fn run(&self, force: bool) -> SyncReport {
        let mut report = SyncReport::default();
        for engine in &self.engines {
            report.absorb(self.run_kind(engine, force));
        }
        tracing::info!(
            processed = report.processed,
            committed = report.committed,
            failed = report.failed,
            "reconciliation finished"
        );
        report
    }

    /// Reconciles a single kind.
    pub fn run_for(&self, kind: EntityKind, force: bool) -> SyncReport {
        self.engines
            .iter()
            .find(|e| e.kind() == kind)
            .map(|engine| self.run_kind(engine, force))
            .unwrap_or_default()
    }

    fn run_kind(&self, engine: &SyncEngine, force: bool) -> SyncReport {
        let kind = engine.kind();
        let mut report = SyncReport::default();

        let candidates = if force {
            engine.entities().list(kind)
        } else {
            engine.entities().list_needing_sync(kind)
        };
        let candidates = match candidates {
            Ok(entities) => entities,
            Err(e) => {
                tracing::error!(error = %e, %kind, "failed to list reconciliation candidates");
                report.failed += 1;
                report.warnings.push(format!("{kind}: {e}"));
                return report;
            },
        };

        let author = CommitAuthor::system();
        for entity in candidates {
            report.processed += 1;

            // A stale title leaves the stored slug behind the derived one;
            // that case routes through the rename-aware update path.
            let result = match engine.resolve_slug(&entity) {
                Ok(derived) if derived != entity.slug => {
                    engine.update_and_commit(&entity.slug, &entity, &author, "system")
                },
                Ok(_) => engine.save_and_commit(&entity, &author, "system"),
                Err(e) => Err(e),
            };

            match result {
                Ok(Some(_)) => report.committed += 1,
                Ok(None) => {
                    if engine.adapter().is_publishable(&entity) {
                        report.unchanged += 1;
                    } else {
                        report.skipped_draft += 1;
                    }
                },
                Err(e) => {
                    report.failed += 1;
                    report.warnings.push(format!("{kind}/{}: {e}", entity.slug));
                },
            }
        }

        report
    }
}
