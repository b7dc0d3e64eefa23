//! The synchronization engine.
//!
//! One generic write path (database row, then mirror file, then git
//! commit, then audit log) instantiated once per entity kind through an
//! [`EntityAdapter`]. The [`SyncService`] facade owns the engines, the
//! shared stores, and the single mutex-guarded git workspace.

mod adapter;
mod engine;
mod health;
mod reconcile;
mod service;

pub use adapter::{
    CustomerProfileAdapter, EntityAdapter, PromptBlockAdapter, PromptModifierAdapter,
    SkillAdapter, adapter_for,
};
pub use engine::SyncEngine;
pub use health::{HealthService, KindHealth, SyncHealthReport};
pub use reconcile::{Reconciler, SyncReport};
pub use service::SyncService;
