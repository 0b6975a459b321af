//! Entity types for the Engram memory system
//!
//! Defines the three memory kinds an agent accumulates over its working
//! life: episodic traces of single task runs, semantic patterns distilled
//! from many runs, and procedural skills with a tracked success rate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hard floor below which importance never decays.
pub const IMPORTANCE_FLOOR: f32 = 0.01;

/// The three entity kinds stored per namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A record of one concrete task execution
    Episode,
    /// A generalized insight distilled from episodes
    Pattern,
    /// A named, reusable action sequence
    Skill,
}

impl EntityKind {
    /// Subdirectory name under a namespace for this kind.
    pub fn dir_name(&self) -> &'static str {
        match self {
            EntityKind::Episode => "episodes",
            EntityKind::Pattern => "patterns",
            EntityKind::Skill => "skills",
        }
    }

    /// All kinds, in storage order.
    pub fn all() -> [EntityKind; 3] {
        [EntityKind::Episode, EntityKind::Pattern, EntityKind::Skill]
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityKind::Episode => "episode",
            EntityKind::Pattern => "pattern",
            EntityKind::Skill => "skill",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "episode" | "episodes" => Ok(EntityKind::Episode),
            "pattern" | "patterns" => Ok(EntityKind::Pattern),
            "skill" | "skills" => Ok(EntityKind::Skill),
            other => Err(format!(
                "Unknown entity kind: {other}. Use episode, pattern, or skill."
            )),
        }
    }
}

/// Outcome of a task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Partial,
    Failure,
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(Outcome::Success),
            "partial" => Ok(Outcome::Partial),
            "failure" => Ok(Outcome::Failure),
            other => Err(format!(
                "Unknown outcome: {other}. Use success, partial, or failure."
            )),
        }
    }
}

/// A record of one concrete task execution, written once by the
/// orchestration layer when a task completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeTrace {
    /// Unique identifier for this episode
    pub id: Uuid,
    /// Namespace (project/workspace) this episode belongs to
    pub namespace: String,
    /// Task identifier assigned by the orchestrator
    pub task_id: String,
    /// Which logical agent produced this trace
    pub role: String,
    /// What the task was trying to achieve
    pub goal: String,
    /// Ordered action summaries
    pub actions: Vec<String>,
    /// How the task ended
    pub outcome: Outcome,
    /// Free-text error detail when the task failed
    pub error_detail: Option<String>,
    /// Current importance score
    pub importance: f32,
    /// When this episode was created
    pub created_at: DateTime<Utc>,
    /// When this episode was last selected by retrieval
    pub last_accessed: DateTime<Utc>,
    /// How many times retrieval has selected this episode
    pub access_count: u32,
    /// Set once the episode has been consolidated into semantic memory
    pub archived: bool,
}

impl EpisodeTrace {
    /// Create a new episode trace with default bookkeeping values.
    pub fn new(
        namespace: impl Into<String>,
        task_id: impl Into<String>,
        role: impl Into<String>,
        goal: impl Into<String>,
        actions: Vec<String>,
        outcome: Outcome,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            namespace: namespace.into(),
            task_id: task_id.into(),
            role: role.into(),
            goal: goal.into(),
            actions,
            outcome,
            error_detail: None,
            importance: 0.5,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            archived: false,
        }
    }

    /// Attach free-text error detail.
    pub fn with_error_detail(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }
}

/// Well-known pattern category for recurring failure modes.
pub const CATEGORY_ANTI_PATTERN: &str = "anti-pattern";
/// Well-known pattern category for recurring success approaches.
pub const CATEGORY_SUCCESS_PATTERN: &str = "success-pattern";

/// A generalized, reusable insight extracted from one or more episodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticPattern {
    /// Unique identifier for this pattern
    pub id: Uuid,
    /// Namespace this pattern belongs to
    pub namespace: String,
    /// Free-form tag, e.g. "anti-pattern" or "success-pattern"
    pub category: String,
    /// Textual description of the insight
    pub description: String,
    /// Confidence in [0, 1], grows with corroborating episodes
    pub confidence: f32,
    /// Associative links to related pattern ids (not a tree)
    pub related: Vec<Uuid>,
    /// Source episode ids, same namespace only
    pub provenance: Vec<Uuid>,
    /// Replacement pattern when this one has been superseded
    pub deprecated_by: Option<Uuid>,
    /// Current importance score
    pub importance: f32,
    /// When this pattern was created
    pub created_at: DateTime<Utc>,
    /// When this pattern was last selected by retrieval
    pub last_accessed: DateTime<Utc>,
    /// How many times retrieval has selected this pattern
    pub access_count: u32,
}

impl SemanticPattern {
    /// Create a new pattern with no provenance yet.
    pub fn new(
        namespace: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            namespace: namespace.into(),
            category: category.into(),
            description: description.into(),
            confidence: 0.0,
            related: Vec::new(),
            provenance: Vec::new(),
            deprecated_by: None,
            importance: 0.5,
            created_at: now,
            last_accessed: now,
            access_count: 0,
        }
    }

    /// Add corroborating episode ids, deduplicating, and refresh confidence.
    ///
    /// Confidence is `n / (n + 1)` where `n` is the provenance count, so
    /// it rises monotonically toward 1.0 and reaches 0.5 at the minimum
    /// cluster size of two.
    pub fn corroborate(&mut self, episode_ids: &[Uuid]) {
        for id in episode_ids {
            if !self.provenance.contains(id) {
                self.provenance.push(*id);
            }
        }
        let n = self.provenance.len() as f32;
        self.confidence = n / (n + 1.0);
    }

    /// Link another pattern bidirectionally is the caller's concern; this
    /// side just records the association, capped and deduplicated.
    pub fn add_related(&mut self, other: Uuid, cap: usize) {
        if other != self.id && !self.related.contains(&other) && self.related.len() < cap {
            self.related.push(other);
        }
    }

    /// Mark this pattern as superseded by a replacement.
    pub fn deprecate(&mut self, replacement: Uuid) {
        self.deprecated_by = Some(replacement);
    }

    /// True once a replacement pattern has been recorded.
    pub fn is_deprecated(&self) -> bool {
        self.deprecated_by.is_some()
    }
}

/// A named, reusable action sequence with a success-rate statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProceduralSkill {
    /// Unique identifier for this skill
    pub id: Uuid,
    /// Namespace this skill belongs to
    pub namespace: String,
    /// Short name for the skill
    pub name: String,
    /// Ordered step descriptions
    pub steps: Vec<String>,
    /// Textual trigger conditions matched against task descriptions
    pub triggers: Vec<String>,
    /// Fraction of known invocations that succeeded
    pub success_rate: f32,
    /// Number of known invocations
    pub usage_count: u32,
    /// Current importance score
    pub importance: f32,
    /// When this skill was created
    pub created_at: DateTime<Utc>,
    /// When this skill was last selected by retrieval
    pub last_accessed: DateTime<Utc>,
    /// How many times retrieval has selected this skill
    pub access_count: u32,
}

impl ProceduralSkill {
    /// Create a new skill with no recorded invocations.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, steps: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            namespace: namespace.into(),
            name: name.into(),
            steps,
            triggers: Vec::new(),
            success_rate: 0.0,
            usage_count: 0,
            importance: 0.5,
            created_at: now,
            last_accessed: now,
            access_count: 0,
        }
    }

    /// Fold one more known invocation into the running success rate.
    pub fn record_invocation(&mut self, success: bool) {
        let successes = self.success_rate * self.usage_count as f32 + if success { 1.0 } else { 0.0 };
        self.usage_count += 1;
        self.success_rate = successes / self.usage_count as f32;
    }
}

/// The store's generic record type: a tagged union over the three kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoryEntity {
    Episode(EpisodeTrace),
    Pattern(SemanticPattern),
    Skill(ProceduralSkill),
}

impl MemoryEntity {
    pub fn id(&self) -> Uuid {
        match self {
            MemoryEntity::Episode(e) => e.id,
            MemoryEntity::Pattern(p) => p.id,
            MemoryEntity::Skill(s) => s.id,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            MemoryEntity::Episode(e) => &e.namespace,
            MemoryEntity::Pattern(p) => &p.namespace,
            MemoryEntity::Skill(s) => &s.namespace,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            MemoryEntity::Episode(_) => EntityKind::Episode,
            MemoryEntity::Pattern(_) => EntityKind::Pattern,
            MemoryEntity::Skill(_) => EntityKind::Skill,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            MemoryEntity::Episode(e) => e.created_at,
            MemoryEntity::Pattern(p) => p.created_at,
            MemoryEntity::Skill(s) => s.created_at,
        }
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        match self {
            MemoryEntity::Episode(e) => e.last_accessed,
            MemoryEntity::Pattern(p) => p.last_accessed,
            MemoryEntity::Skill(s) => s.last_accessed,
        }
    }

    pub fn importance(&self) -> f32 {
        match self {
            MemoryEntity::Episode(e) => e.importance,
            MemoryEntity::Pattern(p) => p.importance,
            MemoryEntity::Skill(s) => s.importance,
        }
    }

    pub fn access_count(&self) -> u32 {
        match self {
            MemoryEntity::Episode(e) => e.access_count,
            MemoryEntity::Pattern(p) => p.access_count,
            MemoryEntity::Skill(s) => s.access_count,
        }
    }

    /// Write back an importance score, clamped to the legal range.
    pub fn set_importance(&mut self, importance: f32) {
        let clamped = importance.clamp(IMPORTANCE_FLOOR, 1.0);
        match self {
            MemoryEntity::Episode(e) => e.importance = clamped,
            MemoryEntity::Pattern(p) => p.importance = clamped,
            MemoryEntity::Skill(s) => s.importance = clamped,
        }
    }

    /// Record one retrieval access. `last_accessed` only moves forward.
    pub fn mark_accessed(&mut self, at: DateTime<Utc>) {
        match self {
            MemoryEntity::Episode(e) => {
                e.access_count += 1;
                e.last_accessed = e.last_accessed.max(at);
            }
            MemoryEntity::Pattern(p) => {
                p.access_count += 1;
                p.last_accessed = p.last_accessed.max(at);
            }
            MemoryEntity::Skill(s) => {
                s.access_count += 1;
                s.last_accessed = s.last_accessed.max(at);
            }
        }
    }

    /// True for archived episodes; patterns and skills never archive.
    pub fn is_archived(&self) -> bool {
        matches!(self, MemoryEntity::Episode(e) if e.archived)
    }

    /// Category tag for patterns, none for other kinds.
    pub fn category(&self) -> Option<&str> {
        match self {
            MemoryEntity::Pattern(p) => Some(&p.category),
            _ => None,
        }
    }

    /// One-line summary used by the timeline layer.
    pub fn summary_line(&self) -> String {
        match self {
            MemoryEntity::Episode(e) => {
                format!("[{:?}] {} ({})", e.outcome, e.goal, e.role)
            }
            MemoryEntity::Pattern(p) => {
                format!("[{}] {}", p.category, p.description)
            }
            MemoryEntity::Skill(s) => {
                format!(
                    "[skill] {} ({} steps, {:.0}% success)",
                    s.name,
                    s.steps.len(),
                    s.success_rate * 100.0
                )
            }
        }
    }

    /// Text the retriever scores against the caller's query.
    pub fn relevance_text(&self) -> String {
        match self {
            MemoryEntity::Episode(e) => {
                let mut text = format!("{} {}", e.goal, e.actions.join(" "));
                if let Some(ref detail) = e.error_detail {
                    text.push(' ');
                    text.push_str(detail);
                }
                text
            }
            MemoryEntity::Pattern(p) => format!("{} {}", p.category, p.description),
            MemoryEntity::Skill(s) => {
                format!("{} {} {}", s.name, s.triggers.join(" "), s.steps.join(" "))
            }
        }
    }

    /// Approximate token cost of reading this entity at full detail.
    pub fn approx_tokens(&self) -> usize {
        serde_json::to_string(self)
            .map(|s| approx_tokens(&s))
            .unwrap_or(0)
    }
}

/// Abstract token estimate for a piece of text (roughly 4 bytes per token).
pub fn approx_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}
