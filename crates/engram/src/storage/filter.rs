//! Filter criteria for entity listing
//!
//! All fields are optional - when `None`, that filter is not applied.
//! Multiple filters are combined with AND logic.

use chrono::{DateTime, Utc};

use crate::memory::types::MemoryEntity;

/// Filter criteria applied by `EntityStore::list`.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    /// Only return entities created strictly after this time
    pub created_after: Option<DateTime<Utc>>,
    /// Only return entities created at or before this time
    pub created_before: Option<DateTime<Utc>>,
    /// Filter patterns by category tag
    pub category: Option<String>,
    /// Minimum stored importance (inclusive; decay is applied by readers)
    pub min_importance: Option<f32>,
    /// Include archived episodes (excluded by default)
    pub include_archived: bool,
}

impl EntityFilter {
    /// Create a new empty filter (no filtering applied).
    pub fn new() -> Self {
        Self::default()
    }

    /// Only entities created strictly after `after`.
    pub fn created_after(mut self, after: DateTime<Utc>) -> Self {
        self.created_after = Some(after);
        self
    }

    /// Only entities created at or before `before`.
    pub fn created_before(mut self, before: DateTime<Utc>) -> Self {
        self.created_before = Some(before);
        self
    }

    /// Only patterns carrying this category tag.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Only entities at or above this stored importance.
    pub fn with_min_importance(mut self, min_importance: f32) -> Self {
        self.min_importance = Some(min_importance);
        self
    }

    /// Include episodes already consolidated into semantic memory.
    pub fn with_archived(mut self) -> Self {
        self.include_archived = true;
        self
    }

    /// Check whether an entity passes every configured condition.
    pub fn matches(&self, entity: &MemoryEntity) -> bool {
        if !self.include_archived && entity.is_archived() {
            return false;
        }
        if let Some(after) = self.created_after {
            if entity.created_at() <= after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if entity.created_at() > before {
                return false;
            }
        }
        if let Some(ref category) = self.category {
            if entity.category() != Some(category.as_str()) {
                return false;
            }
        }
        if let Some(min) = self.min_importance {
            if entity.importance() < min {
                return false;
            }
        }
        true
    }

    /// Check if this filter is empty (no conditions set).
    pub fn is_empty(&self) -> bool {
        self.created_after.is_none()
            && self.created_before.is_none()
            && self.category.is_none()
            && self.min_importance.is_none()
            && !self.include_archived
    }
}
