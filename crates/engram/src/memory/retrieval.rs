//! Budget-aware retrieval with progressive disclosure
//!
//! Given a task type, a free-text query, and a token budget, assembles
//! the highest-value bounded set of memories. Spending follows a fixed
//! order that is part of the design, not an optimization: the Layer-1
//! index first (up to ~20% of budget), then Layer-2 timeline lines (up
//! to ~40% cumulative), and only then Layer-3 full reads with the
//! remainder. The retriever can therefore never blow the whole budget on
//! full reads of low-value entities before seeing what exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ImportanceConfig, RetrievalConfig};
use crate::consolidation::similarity::Similarity;
use crate::economics::RetrievalSample;
use crate::error::{EngramError, Result};
use crate::index::{IndexSummary, TimelineEntry};
use crate::memory::importance::{apply_boost, decay};
use crate::memory::types::{EntityKind, MemoryEntity};
use crate::storage::EntityStore;

/// One retrieval call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub namespace: String,
    /// Task-type tag folded into text scoring (e.g. "bugfix")
    #[serde(default)]
    pub task_type: Option<String>,
    /// Free-text description of the task at hand
    pub query: String,
    /// Maximum cost in abstract tokens; the configured default applies
    /// when absent
    #[serde(default)]
    pub budget: Option<usize>,
}

/// Tokens spent per disclosure layer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub index_tokens: usize,
    pub timeline_tokens: usize,
    pub full_tokens: usize,
}

impl CostBreakdown {
    pub fn total(&self) -> usize {
        self.index_tokens + self.timeline_tokens + self.full_tokens
    }

    /// Discovery cost: everything spent before full reads.
    pub fn discovery(&self) -> usize {
        self.index_tokens + self.timeline_tokens
    }
}

/// A fully disclosed entity with its ranking score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEntity {
    pub relevance: f32,
    pub cost_tokens: usize,
    pub entity: MemoryEntity,
}

/// The bounded context package handed back to the caller. Always
/// well-formed; a zero budget simply yields empty layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub namespace: String,
    pub budget: usize,
    pub cost: CostBreakdown,
    /// Layer 1: the namespace summary, when it fit its budget share
    pub summary: Option<IndexSummary>,
    /// Layer 2: disclosed timeline lines, newest first
    pub timeline: Vec<TimelineEntry>,
    /// Layer 3: full records, highest relevance first
    pub entities: Vec<ScoredEntity>,
}

impl RetrievalResult {
    fn empty(namespace: impl Into<String>, budget: usize) -> Self {
        Self {
            namespace: namespace.into(),
            budget,
            cost: CostBreakdown::default(),
            summary: None,
            timeline: Vec::new(),
            entities: Vec::new(),
        }
    }
}

/// A drill-down candidate surfaced by the discovery layers.
struct Candidate {
    id: Uuid,
    kind: EntityKind,
    stored_importance: f32,
    created_at: Option<DateTime<Utc>>,
    est_full_tokens: usize,
    relevance: f32,
}

/// Budget-aware retriever over one store.
pub struct Retriever<'a> {
    store: &'a EntityStore,
    similarity: &'a dyn Similarity,
    config: &'a RetrievalConfig,
    importance: &'a ImportanceConfig,
}

impl<'a> Retriever<'a> {
    pub fn new(
        store: &'a EntityStore,
        similarity: &'a dyn Similarity,
        config: &'a RetrievalConfig,
        importance: &'a ImportanceConfig,
    ) -> Self {
        Self {
            store,
            similarity,
            config,
            importance,
        }
    }

    /// Assemble a context package within the budget and boost the
    /// importance of every entity disclosed at full detail (exactly once
    /// per entity per call). Returns the package plus the economics
    /// sample describing what the call cost.
    pub fn retrieve(&self, request: &RetrievalRequest) -> Result<(RetrievalResult, RetrievalSample)> {
        let budget = request.budget.unwrap_or(self.config.default_budget);
        let mut result = RetrievalResult::empty(&request.namespace, budget);
        let mut sample = RetrievalSample::default();

        if budget == 0 {
            return Ok((result, sample));
        }

        let now = Utc::now();
        let query_text = match &request.task_type {
            Some(task_type) => format!("{task_type} {}", request.query),
            None => request.query.clone(),
        };

        let meta = self.store.read_meta(&request.namespace)?;

        // Layer 1: the index summary, within its fixed budget share.
        let index_budget = (budget as f32 * self.config.index_fraction) as usize;
        let summary = IndexSummary::from_meta(&request.namespace, &meta);
        let summary = if summary.approx_tokens() <= index_budget {
            Some(summary)
        } else {
            let slim = summary.without_top_patterns();
            (slim.approx_tokens() <= index_budget).then_some(slim)
        };
        if let Some(ref summary) = summary {
            result.cost.index_tokens = summary.approx_tokens();
        }

        // Layer 2: timeline lines, newest first, within the cumulative
        // discovery share.
        let discovery_cap = (budget as f32 * self.config.timeline_fraction) as usize;
        for entry in &meta.timeline {
            let entry_cost = entry.approx_tokens();
            if result.cost.total() + entry_cost > discovery_cap {
                break;
            }
            result.cost.timeline_tokens += entry_cost;
            result.timeline.push(entry.clone());
        }

        // Score every surfaced candidate from metadata alone.
        let mut candidates = self.collect_candidates(&result, summary.as_ref(), &query_text, now);
        candidates.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.stored_importance
                        .partial_cmp(&a.stored_importance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        result.summary = summary;

        // Layer 3: full reads with whatever budget remains, most
        // relevant first. Candidates whose estimated cost no longer fits
        // are skipped; a smaller one later may still fit.
        let mut read_ids: Vec<Uuid> = Vec::new();
        for candidate in &candidates {
            if result.cost.total() >= budget {
                break;
            }
            if candidate.est_full_tokens > 0
                && result.cost.total() + candidate.est_full_tokens > budget
            {
                continue;
            }
            let entity = match self.store.get(&request.namespace, candidate.kind, candidate.id) {
                Ok(entity) => entity,
                // Unavailable entities are silently excluded.
                Err(EngramError::NotFound { .. }) | Err(EngramError::CorruptEntity { .. }) => {
                    continue;
                }
                Err(e) => return Err(e),
            };
            let cost = entity.approx_tokens();
            if result.cost.total() + cost > budget {
                continue;
            }

            let entity = self.boost(entity, now);
            result.cost.full_tokens += cost;
            read_ids.push(candidate.id);
            result.entities.push(ScoredEntity {
                relevance: candidate.relevance,
                cost_tokens: cost,
                entity,
            });
        }

        sample.discovery_tokens = result.cost.discovery() as u64;
        sample.full_tokens = result.cost.full_tokens as u64;
        sample.full_equivalent_tokens = candidates
            .iter()
            .filter(|c| !read_ids.contains(&c.id))
            .map(|c| c.est_full_tokens as u64)
            .sum();

        tracing::debug!(
            namespace = %request.namespace,
            budget,
            spent = result.cost.total(),
            disclosed = result.entities.len(),
            "Retrieval complete"
        );
        Ok((result, sample))
    }

    /// Candidates come from the disclosed timeline lines plus the
    /// Layer-1 top-pattern titles, deduplicated by id. Both are pure
    /// metadata; nothing is loaded at full detail yet.
    fn collect_candidates(
        &self,
        result: &RetrievalResult,
        summary: Option<&IndexSummary>,
        query_text: &str,
        now: DateTime<Utc>,
    ) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = Vec::new();

        for entry in &result.timeline {
            candidates.push(self.make_candidate(
                entry.id,
                entry.kind,
                &entry.line,
                entry.importance,
                Some(entry.created_at),
                entry.full_tokens,
                query_text,
                now,
            ));
        }

        if let Some(summary) = summary {
            for title in &summary.top_patterns {
                if candidates.iter().any(|c| c.id == title.id) {
                    continue;
                }
                candidates.push(self.make_candidate(
                    title.id,
                    EntityKind::Pattern,
                    &title.title,
                    title.importance,
                    None,
                    0,
                    query_text,
                    now,
                ));
            }
        }

        candidates
    }

    #[allow(clippy::too_many_arguments)]
    fn make_candidate(
        &self,
        id: Uuid,
        kind: EntityKind,
        text: &str,
        stored_importance: f32,
        created_at: Option<DateTime<Utc>>,
        est_full_tokens: usize,
        query_text: &str,
        now: DateTime<Utc>,
    ) -> Candidate {
        // Stored importance is decayed from creation; the true decay
        // origin (last access) is only in the full record, so this is a
        // conservative metadata-level estimate.
        let importance_score = match created_at {
            Some(created) => decay(
                stored_importance,
                created,
                now,
                self.importance.half_life_days(kind),
            ),
            None => stored_importance,
        };
        let recency_score = match created_at {
            Some(created) => {
                let age_days = (now - created).num_seconds().max(0) as f32 / 86_400.0;
                0.5_f32.powf(age_days / self.config.recency_half_life_days)
            }
            None => 0.0,
        };
        let text_score = self.similarity.score(query_text, text);

        let relevance = self.config.importance_weight * importance_score
            + self.config.recency_weight * recency_score
            + self.config.text_weight * text_score;

        Candidate {
            id,
            kind,
            stored_importance,
            created_at,
            est_full_tokens,
            relevance,
        }
    }

    /// One boost per selected entity per retrieval. A write-lock timeout
    /// here degrades to read-only instead of failing the retrieval.
    fn boost(&self, mut entity: MemoryEntity, now: DateTime<Utc>) -> MemoryEntity {
        apply_boost(&mut entity, now, self.importance);
        match self.store.put(&entity) {
            Ok(_) => entity,
            Err(EngramError::LockTimeout(path)) => {
                tracing::warn!("Skipping importance boost under contention: {path}");
                entity
            }
            Err(e) => {
                tracing::warn!("Failed to persist importance boost: {e}");
                entity
            }
        }
    }
}
