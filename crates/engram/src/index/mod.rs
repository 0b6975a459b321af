//! Progressive disclosure index
//!
//! Three views over the same entities at increasing cost: a compact
//! per-namespace summary (Layer 1), a one-line-per-entry timeline of
//! recent activity (Layer 2), and full records fetched by id through the
//! store (Layer 3). Layers 1 and 2 are derived purely from metadata kept
//! in the namespace `meta.json`, updated incrementally on every put, so
//! their cost stays flat as history grows.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::IndexConfig;
use crate::memory::types::{approx_tokens, EntityKind, MemoryEntity};

/// Entity counts by kind for one namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub episodes: usize,
    pub patterns: usize,
    pub skills: usize,
}

impl KindCounts {
    pub fn increment(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::Episode => self.episodes += 1,
            EntityKind::Pattern => self.patterns += 1,
            EntityKind::Skill => self.skills += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.episodes + self.patterns + self.skills
    }
}

/// A pattern title surfaced in the Layer-1 summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternTitle {
    pub id: Uuid,
    pub title: String,
    pub importance: f32,
}

/// One line in the Layer-2 timeline.
///
/// Carries just enough metadata for the retriever to score the entry
/// without loading the full record: the summary line, the stored
/// importance at last write, and the estimated full-read cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: Uuid,
    pub kind: EntityKind,
    pub line: String,
    pub importance: f32,
    pub full_tokens: usize,
    pub created_at: DateTime<Utc>,
}

impl TimelineEntry {
    fn from_entity(entity: &MemoryEntity) -> Self {
        Self {
            id: entity.id(),
            kind: entity.kind(),
            line: entity.summary_line(),
            importance: entity.importance(),
            full_tokens: entity.approx_tokens(),
            created_at: entity.created_at(),
        }
    }

    /// Approximate token cost of disclosing this entry at Layer 2.
    pub fn approx_tokens(&self) -> usize {
        serde_json::to_string(self)
            .map(|s| approx_tokens(&s))
            .unwrap_or(0)
    }
}

/// Per-namespace metadata file: the consolidation watermark plus the
/// incrementally maintained Layer-1 and Layer-2 caches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamespaceMeta {
    /// Episodes created at or before this instant have been consolidated
    pub watermark: Option<DateTime<Utc>>,
    /// Fresh episodes written since the last consolidation run
    pub new_episodes: usize,
    /// Entity counts by kind
    pub counts: KindCounts,
    /// Pattern counts by category tag
    pub categories: BTreeMap<String, usize>,
    /// Highest-importance live pattern titles
    pub top_patterns: Vec<PatternTitle>,
    /// Recent entries, newest first, capped
    pub timeline: Vec<TimelineEntry>,
}

impl NamespaceMeta {
    /// Fold one store write into the cached views. `fresh` is true when
    /// the write created the entity rather than overwriting it.
    pub fn apply_put(&mut self, entity: &MemoryEntity, fresh: bool, config: &IndexConfig) {
        if fresh {
            self.counts.increment(entity.kind());
            if entity.kind() == EntityKind::Episode {
                self.new_episodes += 1;
            }
            if let Some(category) = entity.category() {
                *self.categories.entry(category.to_string()).or_insert(0) += 1;
            }
            self.timeline.insert(0, TimelineEntry::from_entity(entity));
            self.timeline.truncate(config.timeline_cap);
        } else if let Some(entry) = self.timeline.iter_mut().find(|e| e.id == entity.id()) {
            // Overwrites refresh the cached line in place; entries that
            // already rotated out of the ring stay gone.
            entry.line = entity.summary_line();
            entry.importance = entity.importance();
            entry.full_tokens = entity.approx_tokens();
        }

        if let MemoryEntity::Pattern(pattern) = entity {
            self.top_patterns.retain(|t| t.id != pattern.id);
            if pattern.deprecated_by.is_none() {
                self.top_patterns.push(PatternTitle {
                    id: pattern.id,
                    title: pattern.description.clone(),
                    importance: pattern.importance,
                });
            }
            self.top_patterns.sort_by(|a, b| {
                b.importance
                    .partial_cmp(&a.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            self.top_patterns.truncate(config.top_patterns);
        }
    }

    /// Rebuild the cached views from a full entity scan, preserving the
    /// consolidation watermark. Used for recovery after corruption.
    pub fn rebuild(
        watermark: Option<DateTime<Utc>>,
        entities: &[MemoryEntity],
        config: &IndexConfig,
    ) -> Self {
        let mut ordered: Vec<&MemoryEntity> = entities.iter().collect();
        ordered.sort_by_key(|e| e.created_at());

        let mut meta = NamespaceMeta {
            watermark,
            ..NamespaceMeta::default()
        };
        for entity in &ordered {
            meta.apply_put(entity, true, config);
        }

        // `apply_put` counts every fresh episode; recompute against the
        // preserved watermark instead.
        meta.new_episodes = ordered
            .iter()
            .filter(|e| {
                e.kind() == EntityKind::Episode
                    && !e.is_archived()
                    && watermark.is_none_or(|w| e.created_at() > w)
            })
            .count();

        meta
    }

    /// The most recent `limit` timeline entries, newest first.
    pub fn timeline_page(&self, limit: usize) -> &[TimelineEntry] {
        &self.timeline[..limit.min(self.timeline.len())]
    }
}

/// The Layer-1 view: a compact namespace summary whose cost does not
/// grow with history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSummary {
    pub namespace: String,
    pub counts: KindCounts,
    pub new_episodes: usize,
    pub last_consolidated: Option<DateTime<Utc>>,
    pub categories: BTreeMap<String, usize>,
    pub top_patterns: Vec<PatternTitle>,
}

impl IndexSummary {
    pub fn from_meta(namespace: impl Into<String>, meta: &NamespaceMeta) -> Self {
        Self {
            namespace: namespace.into(),
            counts: meta.counts,
            new_episodes: meta.new_episodes,
            last_consolidated: meta.watermark,
            categories: meta.categories.clone(),
            top_patterns: meta.top_patterns.clone(),
        }
    }

    /// Approximate token cost of disclosing this summary.
    pub fn approx_tokens(&self) -> usize {
        serde_json::to_string(self)
            .map(|s| approx_tokens(&s))
            .unwrap_or(0)
    }

    /// A slimmer copy with pattern titles dropped, for tight budgets.
    pub fn without_top_patterns(&self) -> Self {
        Self {
            top_patterns: Vec::new(),
            categories: self.categories.clone(),
            ..self.clone()
        }
    }
}
