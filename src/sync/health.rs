//! Sync health reporting.
//!
//! Aggregates the cached per-entity status counters with log-derived
//! signals (recent failures, stuck pending rows) into a per-kind report.
//! Health inspection is read-only and must never fail the caller: if a
//! store query errors, the report degrades rather than propagating.

use crate::models::EntityKind;
use crate::storage::sqlite::StatusCounts;
use crate::storage::{EntityStore, SyncLogStore};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;

/// Health summary for one entity kind.
#[derive(Debug, Clone, Serialize)]
pub struct KindHealth {
    /// The kind reported on.
    pub kind: EntityKind,
    /// Entities whose mirror matches the row.
    pub synced: u64,
    /// Entities awaiting a sync attempt.
    pub pending: u64,
    /// Entities whose last attempt failed.
    pub failed: u64,
    /// Entities never synchronized.
    pub unknown: u64,
    /// Total entity count.
    pub total: u64,
    /// Failed log rows inside the reporting window.
    pub recent_failures: u64,
    /// Pending log rows older than the stuck threshold.
    pub stuck_pending: u64,
    /// No failed entities and no recent failures.
    pub healthy: bool,
}

impl KindHealth {
    fn from_counts(
        kind: EntityKind,
        counts: StatusCounts,
        recent_failures: u64,
        stuck_pending: u64,
    ) -> Self {
        Self {
            kind,
            synced: counts.synced,
            pending: counts.pending,
            failed: counts.failed,
            unknown: counts.unknown,
            total: counts.total(),
            recent_failures,
            stuck_pending,
            healthy: counts.failed == 0 && recent_failures == 0,
        }
    }
}

/// Health report across all entity kinds.
#[derive(Debug, Clone, Serialize)]
pub struct SyncHealthReport {
    /// Per-kind summaries, in kind declaration order.
    pub kinds: Vec<KindHealth>,
    /// True when every kind is healthy and no errors degraded the report.
    pub healthy: bool,
    /// Store errors encountered while assembling the report.
    pub errors: Vec<String>,
}

impl SyncHealthReport {
    /// Total entities across all kinds.
    #[must_use]
    pub fn total_entities(&self) -> u64 {
        self.kinds.iter().map(|k| k.total).sum()
    }
}

/// Read-only health inspector over the entity and log stores.
pub struct HealthService {
    entities: Arc<EntityStore>,
    log: Arc<SyncLogStore>,
    /// Window for counting recent failures, in seconds.
    failure_window_secs: u64,
    /// Age past which a pending log row counts as stuck, in seconds.
    stuck_threshold_secs: u64,
}

impl HealthService {
    /// Creates a health service with the given reporting windows.
    #[must_use]
    pub fn new(
        entities: Arc<EntityStore>,
        log: Arc<SyncLogStore>,
        failure_window_secs: u64,
        stuck_threshold_secs: u64,
    ) -> Self {
        Self {
            entities,
            log,
            failure_window_secs,
            stuck_threshold_secs,
        }
    }

    /// Assembles the health summary for one kind.
    ///
    /// # Errors
    ///
    /// Returns an error if a store query fails.
    pub fn kind_health(&self, kind: EntityKind) -> Result<KindHealth> {
        let counts = self.entities.counts_by_status(kind)?;
        let recent_failures = self.log.recent_failures(kind, self.failure_window_secs)?;
        let stuck_pending = self.log.stuck_pending(kind, self.stuck_threshold_secs)?;
        Ok(KindHealth::from_counts(
            kind,
            counts,
            recent_failures,
            stuck_pending,
        ))
    }

    /// Assembles the full report. Never fails: a kind whose queries error
    /// is reported as unhealthy with the error attached, so a database
    /// problem surfaces as a degraded report instead of a failed health
    /// check.
    #[must_use]
    pub fn report(&self) -> SyncHealthReport {
        let mut kinds = Vec::new();
        let mut errors = Vec::new();

        for kind in EntityKind::all() {
            match self.kind_health(*kind) {
                Ok(health) => kinds.push(health),
                Err(e) => {
                    tracing::warn!(error = %e, kind = %kind, "health query failed");
                    errors.push(format!("{kind}: {e}"));
                    kinds.push(KindHealth {
                        kind: *kind,
                        synced: 0,
                        pending: 0,
                        failed: 0,
                        unknown: 0,
                        total: 0,
                        recent_failures: 0,
                        stuck_pending: 0,
                        healthy: false,
                    });
                },
            }
        }

        let healthy = errors.is_empty() && kinds.iter().all(|k| k.healthy);
        SyncHealthReport {
            kinds,
            healthy,
            errors,
        }
    }

    /// Convenience wrapper matching the CLI surface: report, but as a
    /// `Result` for callers that treat degraded as an error.
    ///
    /// # Errors
    ///
    /// Returns an error when the report carries store errors.
    pub fn report_strict(&self) -> Result<SyncHealthReport> {
        let report = self.report();
        if report.errors.is_empty() {
            Ok(report)
        } else {
            Err(Error::OperationFailed {
                operation: "health_report".to_string(),
                cause: report.errors.join("; "),
            })
        }
    }
}
