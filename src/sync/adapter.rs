//! Per-kind adapters for the generic sync engine.
//!
//! The write path is identical for every entity kind; what differs is the
//! kind directory, the front-matter shape, the commit-message template,
//! and whether the review workflow gates mirroring. Each kind supplies
//! those through an [`EntityAdapter`] instead of duplicating the pipeline.

use crate::models::{EntityKind, EntityRecord, ReviewStatus, SyncOperation};
use crate::storage::frontmatter;
use crate::Result;
use chrono::{TimeZone, Utc};
use serde_json::{Map, Value, json};

/// Kind-specific behavior plugged into the [`SyncEngine`](super::SyncEngine).
pub trait EntityAdapter: Send + Sync {
    /// The entity kind this adapter serves.
    fn kind(&self) -> EntityKind;

    /// Directory under the repo root holding this kind's mirror files.
    fn directory(&self) -> &'static str;

    /// Front-matter metadata for an entity.
    fn front_matter(&self, entity: &EntityRecord) -> Value;

    /// Commit message for an operation on an entity.
    fn commit_message(&self, operation: SyncOperation, title: &str) -> String;

    /// Review gating: whether this entity may be mirrored right now.
    ///
    /// Ungated kinds return true unconditionally.
    fn is_publishable(&self, _entity: &EntityRecord) -> bool {
        true
    }

    /// Renders the full mirror file content for an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if front-matter serialization fails.
    fn to_file_representation(&self, entity: &EntityRecord) -> Result<String> {
        frontmatter::render(&self.front_matter(entity), &entity.body)
    }
}

/// Returns the adapter for a kind.
#[must_use]
pub fn adapter_for(kind: EntityKind) -> Box<dyn EntityAdapter> {
    match kind {
        EntityKind::Skill => Box::new(SkillAdapter),
        EntityKind::CustomerProfile => Box::new(CustomerProfileAdapter),
        EntityKind::PromptBlock => Box::new(PromptBlockAdapter),
        EntityKind::PromptModifier => Box::new(PromptModifierAdapter),
    }
}

/// Fields shared by every kind's front matter.
fn base_front_matter(entity: &EntityRecord) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("id".to_string(), json!(entity.id));
    map.insert("kind".to_string(), json!(entity.kind.as_str()));
    map.insert("title".to_string(), json!(entity.title));
    map.insert("created".to_string(), json!(rfc3339(entity.created_at)));
    map.insert("updated".to_string(), json!(rfc3339(entity.updated_at)));
    map
}

fn rfc3339(epoch_secs: u64) -> String {
    Utc.timestamp_opt(i64::try_from(epoch_secs).unwrap_or(0), 0)
        .single()
        .unwrap_or_default()
        .to_rfc3339()
}

/// Skills: distilled knowledge documents. Gated by the review workflow,
/// so only published skills are mirrored.
pub struct SkillAdapter;

impl EntityAdapter for SkillAdapter {
    fn kind(&self) -> EntityKind {
        EntityKind::Skill
    }

    fn directory(&self) -> &'static str {
        "skills"
    }

    fn front_matter(&self, entity: &EntityRecord) -> Value {
        let mut map = base_front_matter(entity);
        map.insert("categories".to_string(), json!(entity.categories));
        if let Some(source) = &entity.source_ref {
            map.insert("source".to_string(), json!(source));
        }
        Value::Object(map)
    }

    fn commit_message(&self, operation: SyncOperation, title: &str) -> String {
        match operation {
            SyncOperation::Create => format!("Add skill: {title}"),
            SyncOperation::Update => format!("Update skill: {title}"),
            SyncOperation::Delete => format!("Remove skill: {title}"),
        }
    }

    fn is_publishable(&self, entity: &EntityRecord) -> bool {
        entity.review_status == ReviewStatus::Published
    }
}

/// Customer profiles. Not review-gated.
pub struct CustomerProfileAdapter;

impl EntityAdapter for CustomerProfileAdapter {
    fn kind(&self) -> EntityKind {
        EntityKind::CustomerProfile
    }

    fn directory(&self) -> &'static str {
        "customers"
    }

    fn front_matter(&self, entity: &EntityRecord) -> Value {
        let mut map = base_front_matter(entity);
        if let Some(owner) = &entity.owner {
            map.insert("owner".to_string(), json!(owner));
        }
        map.insert("segments".to_string(), json!(entity.categories));
        Value::Object(map)
    }

    fn commit_message(&self, operation: SyncOperation, title: &str) -> String {
        match operation {
            SyncOperation::Create => format!("Add customer profile: {title}"),
            SyncOperation::Update => format!("Update customer profile: {title}"),
            SyncOperation::Delete => format!("Remove customer profile: {title}"),
        }
    }
}

/// Prompt blocks: reusable prompt sections. Gated like skills; drafts
/// stay out of the mirror until published.
pub struct PromptBlockAdapter;

impl EntityAdapter for PromptBlockAdapter {
    fn kind(&self) -> EntityKind {
        EntityKind::PromptBlock
    }

    fn directory(&self) -> &'static str {
        "prompt-blocks"
    }

    fn front_matter(&self, entity: &EntityRecord) -> Value {
        prompt_front_matter(entity)
    }

    fn commit_message(&self, operation: SyncOperation, title: &str) -> String {
        match operation {
            SyncOperation::Create => format!("Add prompt block: {title}"),
            SyncOperation::Update => format!("Update prompt block: {title}"),
            SyncOperation::Delete => format!("Remove prompt block: {title}"),
        }
    }

    fn is_publishable(&self, entity: &EntityRecord) -> bool {
        entity.review_status == ReviewStatus::Published
    }
}

/// Prompt modifiers: adjustments layered on top of prompt blocks. Same
/// shape and gating as blocks, separate directory and kind tag.
pub struct PromptModifierAdapter;

impl EntityAdapter for PromptModifierAdapter {
    fn kind(&self) -> EntityKind {
        EntityKind::PromptModifier
    }

    fn directory(&self) -> &'static str {
        "prompt-modifiers"
    }

    fn front_matter(&self, entity: &EntityRecord) -> Value {
        prompt_front_matter(entity)
    }

    fn commit_message(&self, operation: SyncOperation, title: &str) -> String {
        match operation {
            SyncOperation::Create => format!("Add prompt modifier: {title}"),
            SyncOperation::Update => format!("Update prompt modifier: {title}"),
            SyncOperation::Delete => format!("Remove prompt modifier: {title}"),
        }
    }

    fn is_publishable(&self, entity: &EntityRecord) -> bool {
        entity.review_status == ReviewStatus::Published
    }
}

fn prompt_front_matter(entity: &EntityRecord) -> Value {
    let mut map = base_front_matter(entity);
    map.insert("tags".to_string(), json!(entity.categories));
    if let Some(owner) = &entity.owner {
        map.insert("owner".to_string(), json!(owner));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::frontmatter;

    fn skill() -> EntityRecord {
        EntityRecord::new(EntityKind::Skill, "Access Management", "How to manage access.")
            .with_categories(vec!["iam".to_string(), "security".to_string()])
    }

    #[test]
    fn test_skill_file_representation() {
        let adapter = SkillAdapter;
        let entity = skill();
        let content = adapter.to_file_representation(&entity).unwrap();

        let (metadata, body) = frontmatter::parse(&content).unwrap();
        assert_eq!(metadata["id"], entity.id.as_str());
        assert_eq!(metadata["kind"], "skill");
        assert_eq!(metadata["title"], "Access Management");
        assert_eq!(metadata["categories"][0], "iam");
        assert_eq!(body, "How to manage access.");
    }

    #[test]
    fn test_skill_gating() {
        let adapter = SkillAdapter;
        let published = skill();
        let draft = skill().with_review_status(ReviewStatus::Draft);

        assert!(adapter.is_publishable(&published));
        assert!(!adapter.is_publishable(&draft));
    }

    #[test]
    fn test_customer_profile_not_gated() {
        let adapter = CustomerProfileAdapter;
        let draft = EntityRecord::new(EntityKind::CustomerProfile, "Acme Corp", "Profile.")
            .with_review_status(ReviewStatus::Draft);
        assert!(adapter.is_publishable(&draft));
    }

    #[test]
    fn test_customer_profile_owner_in_front_matter() {
        let adapter = CustomerProfileAdapter;
        let entity = EntityRecord::new(EntityKind::CustomerProfile, "Acme Corp", "Profile.")
            .with_owner("sales-emea");
        let metadata = adapter.front_matter(&entity);
        assert_eq!(metadata["owner"], "sales-emea");
    }

    #[test]
    fn test_commit_messages() {
        assert_eq!(
            SkillAdapter.commit_message(SyncOperation::Create, "X"),
            "Add skill: X"
        );
        assert_eq!(
            CustomerProfileAdapter.commit_message(SyncOperation::Delete, "Y"),
            "Remove customer profile: Y"
        );
        assert_eq!(
            PromptModifierAdapter.commit_message(SyncOperation::Update, "Z"),
            "Update prompt modifier: Z"
        );
    }

    #[test]
    fn test_adapter_for_covers_all_kinds() {
        for kind in EntityKind::all() {
            let adapter = adapter_for(*kind);
            assert_eq!(adapter.kind(), *kind);
            assert!(!adapter.directory().is_empty());
        }
    }

    #[test]
    fn test_directories_are_distinct() {
        let mut dirs: Vec<&str> = EntityKind::all()
            .iter()
            .map(|k| adapter_for(*k).directory())
            .collect();
        dirs.sort_unstable();
        dirs.dedup();
        assert_eq!(dirs.len(), EntityKind::all().len());
    }
}
