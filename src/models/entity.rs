//! Entity kinds, review status, and the generic entity record.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The entity kinds mirrored to git.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    /// Distilled knowledge documents.
    Skill,
    /// Customer profiles.
    CustomerProfile,
    /// Prompt building blocks.
    PromptBlock,
    /// Prompt modifiers applied on top of blocks.
    PromptModifier,
}

impl EntityKind {
    /// Returns all entity kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Skill,
            Self::CustomerProfile,
            Self::PromptBlock,
            Self::PromptModifier,
        ]
    }

    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Skill => "skill",
            Self::CustomerProfile => "customer-profile",
            Self::PromptBlock => "prompt-block",
            Self::PromptModifier => "prompt-modifier",
        }
    }

    /// Parses a kind string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for unknown kinds.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "skill" => Ok(Self::Skill),
            "customer-profile" => Ok(Self::CustomerProfile),
            "prompt-block" => Ok(Self::PromptBlock),
            "prompt-modifier" => Ok(Self::PromptModifier),
            other => Err(Error::InvalidInput(format!("unknown entity kind: {other}"))),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cached synchronization status on an entity row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Last sync attempt succeeded and the mirror reflects this row.
    Synced,
    /// A sync attempt is queued or in flight.
    Pending,
    /// The last sync attempt failed.
    Failed,
    /// Never synchronized (rows predating the engine).
    #[default]
    Unknown,
}

impl SyncStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a status string, defaulting to `Unknown`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "synced" => Self::Synced,
            "pending" => Self::Pending,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review workflow status. Only published entities are mirrored to git
/// for gated kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    /// Under review; not mirrored for gated kinds.
    Draft,
    /// Published and eligible for mirroring.
    #[default]
    Published,
}

impl ReviewStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }

    /// Parses a review status string, defaulting to `Published`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s == "draft" { Self::Draft } else { Self::Published }
    }
}

/// A knowledge entity row. The relational store is the source of truth;
/// the markdown mirror is derived from this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Stable database identity. Never changes, survives renames.
    pub id: String,
    /// Entity kind.
    pub kind: EntityKind,
    /// Human-editable display title.
    pub title: String,
    /// Derived filesystem-safe identifier; changes when the title changes.
    pub slug: String,
    /// Free-text markdown body.
    pub body: String,
    /// Category labels (front matter).
    pub categories: Vec<String>,
    /// Owning user or team (front matter).
    pub owner: Option<String>,
    /// Reference to the originating document or system.
    pub source_ref: Option<String>,
    /// Review workflow status.
    pub review_status: ReviewStatus,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
    /// Last update timestamp (Unix epoch seconds).
    pub updated_at: u64,
    /// Cached sync status.
    pub sync_status: SyncStatus,
    /// Timestamp of the last successful commit, or `None`.
    pub last_synced_at: Option<u64>,
    /// Commit id that last captured this entity's state, or `None`.
    pub git_commit_sha: Option<String>,
}

impl EntityRecord {
    /// Creates a new entity with a fresh UUID and sensible defaults.
    #[must_use]
    pub fn new(kind: EntityKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = crate::current_timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            slug: String::new(),
            body: body.into(),
            categories: Vec::new(),
            owner: None,
            source_ref: None,
            review_status: ReviewStatus::Published,
            created_at: now,
            updated_at: now,
            sync_status: SyncStatus::Unknown,
            last_synced_at: None,
            git_commit_sha: None,
        }
    }

    /// Sets the categories.
    #[must_use]
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    /// Sets the owner.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Sets the review status.
    #[must_use]
    pub const fn with_review_status(mut self, status: ReviewStatus) -> Self {
        self.review_status = status;
        self
    }
}
