//! Configuration for the Engram memory subsystem
//!
//! All tuned constants (decay half-lives, retrieval weights, budget
//! fractions, lock backoff) live here as configurable defaults rather
//! than hardcoded values.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{EngramError, Result};
use crate::memory::types::EntityKind;

/// Main configuration structure for Engram
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// On-disk store location and locking behavior
    #[serde(default)]
    pub storage: StorageConfig,
    /// Progressive disclosure index sizing
    #[serde(default)]
    pub index: IndexConfig,
    /// Importance scoring, decay, and boost parameters
    #[serde(default)]
    pub importance: ImportanceConfig,
    /// Budget-aware retrieval parameters
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Consolidation pipeline parameters
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
    /// Similarity scoring backend selection
    #[serde(default)]
    pub similarity: SimilarityConfig,
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from an explicit path, or from the default
    /// locations (`~/.engram/config.toml`, platform config dir, cwd),
    /// falling back to defaults when no file exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".engram").join("config.toml")),
            dirs::config_dir().map(|c| c.join("engram").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for candidate in default_paths.iter().flatten() {
            if candidate.exists() {
                tracing::info!("Loading config from: {}", candidate.display());
                return Self::from_file(candidate);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngramError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| EngramError::Config(format!("Failed to parse config: {e}")))
    }
}

/// On-disk store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for all namespaces
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Advisory lock acquisition attempts before LockTimeout
    #[serde(default = "default_lock_attempts")]
    pub lock_attempts: u32,
    /// Base delay for exponential lock backoff, in milliseconds
    #[serde(default = "default_lock_base_delay_ms")]
    pub lock_base_delay_ms: u64,
    /// Age after which a lock file left by a dead process is broken
    #[serde(default = "default_lock_stale_secs")]
    pub lock_stale_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            lock_attempts: default_lock_attempts(),
            lock_base_delay_ms: default_lock_base_delay_ms(),
            lock_stale_secs: default_lock_stale_secs(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".engram"))
        .unwrap_or_else(|| PathBuf::from(".engram"))
}

fn default_lock_attempts() -> u32 {
    5
}

fn default_lock_base_delay_ms() -> u64 {
    50
}

fn default_lock_stale_secs() -> u64 {
    60
}

/// Progressive disclosure index sizing
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    /// Number of top pattern titles kept in the Layer-1 summary
    #[serde(default = "default_top_patterns")]
    pub top_patterns: usize,
    /// Number of recent entries kept in the Layer-2 timeline ring
    #[serde(default = "default_timeline_cap")]
    pub timeline_cap: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            top_patterns: default_top_patterns(),
            timeline_cap: default_timeline_cap(),
        }
    }
}

fn default_top_patterns() -> usize {
    5
}

fn default_timeline_cap() -> usize {
    100
}

/// Importance scoring, decay, and boost parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ImportanceConfig {
    /// Initial score for successful episodes
    #[serde(default = "default_success_base")]
    pub success_base: f32,
    /// Initial score for partially successful episodes
    #[serde(default = "default_partial_base")]
    pub partial_base: f32,
    /// Initial score for failed episodes
    #[serde(default = "default_failure_base")]
    pub failure_base: f32,
    /// Floor bonus for failures that carry a lesson (error detail present)
    #[serde(default = "default_learning_bonus")]
    pub learning_bonus: f32,
    /// Bonus for actionable error detail on any outcome
    #[serde(default = "default_error_detail_bonus")]
    pub error_detail_bonus: f32,
    /// Per-corroboration bonus for patterns and skills
    #[serde(default = "default_corroboration_bonus")]
    pub corroboration_bonus: f32,
    /// Fraction of remaining headroom added on each retrieval boost
    #[serde(default = "default_boost")]
    pub boost: f32,
    /// Decay half-life for episodes, in days
    #[serde(default = "default_episode_half_life_days")]
    pub episode_half_life_days: f32,
    /// Decay half-life for patterns, in days
    #[serde(default = "default_pattern_half_life_days")]
    pub pattern_half_life_days: f32,
    /// Decay half-life for skills, in days
    #[serde(default = "default_skill_half_life_days")]
    pub skill_half_life_days: f32,
}

impl ImportanceConfig {
    /// Decay half-life for a given entity kind.
    pub fn half_life_days(&self, kind: EntityKind) -> f32 {
        match kind {
            EntityKind::Episode => self.episode_half_life_days,
            EntityKind::Pattern => self.pattern_half_life_days,
            EntityKind::Skill => self.skill_half_life_days,
        }
    }
}

impl Default for ImportanceConfig {
    fn default() -> Self {
        Self {
            success_base: default_success_base(),
            partial_base: default_partial_base(),
            failure_base: default_failure_base(),
            learning_bonus: default_learning_bonus(),
            error_detail_bonus: default_error_detail_bonus(),
            corroboration_bonus: default_corroboration_bonus(),
            boost: default_boost(),
            episode_half_life_days: default_episode_half_life_days(),
            pattern_half_life_days: default_pattern_half_life_days(),
            skill_half_life_days: default_skill_half_life_days(),
        }
    }
}

fn default_success_base() -> f32 {
    0.6
}

fn default_partial_base() -> f32 {
    0.45
}

fn default_failure_base() -> f32 {
    0.3
}

fn default_learning_bonus() -> f32 {
    0.15
}

fn default_error_detail_bonus() -> f32 {
    0.1
}

fn default_corroboration_bonus() -> f32 {
    0.05
}

fn default_boost() -> f32 {
    0.1
}

fn default_episode_half_life_days() -> f32 {
    7.0
}

fn default_pattern_half_life_days() -> f32 {
    30.0
}

fn default_skill_half_life_days() -> f32 {
    90.0
}

/// Budget-aware retrieval parameters
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Weight of decayed importance in the relevance score
    #[serde(default = "default_importance_weight")]
    pub importance_weight: f32,
    /// Weight of recency in the relevance score
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f32,
    /// Weight of text relevance to the query in the relevance score
    #[serde(default = "default_text_weight")]
    pub text_weight: f32,
    /// Half-life used to normalize recency, in days
    #[serde(default = "default_recency_half_life_days")]
    pub recency_half_life_days: f32,
    /// Fraction of the budget spendable on the Layer-1 index
    #[serde(default = "default_index_fraction")]
    pub index_fraction: f32,
    /// Cumulative fraction spendable after the Layer-2 timeline
    #[serde(default = "default_timeline_fraction")]
    pub timeline_fraction: f32,
    /// Budget used when the caller does not supply one
    #[serde(default = "default_budget")]
    pub default_budget: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            importance_weight: default_importance_weight(),
            recency_weight: default_recency_weight(),
            text_weight: default_text_weight(),
            recency_half_life_days: default_recency_half_life_days(),
            index_fraction: default_index_fraction(),
            timeline_fraction: default_timeline_fraction(),
            default_budget: default_budget(),
        }
    }
}

fn default_importance_weight() -> f32 {
    0.4
}

fn default_recency_weight() -> f32 {
    0.3
}

fn default_text_weight() -> f32 {
    0.3
}

fn default_recency_half_life_days() -> f32 {
    7.0
}

fn default_index_fraction() -> f32 {
    0.2
}

fn default_timeline_fraction() -> f32 {
    0.4
}

fn default_budget() -> usize {
    2000
}

/// Consolidation pipeline parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ConsolidationConfig {
    /// New episodes accumulated before an automatic run triggers
    #[serde(default = "default_trigger_threshold")]
    pub trigger_threshold: usize,
    /// Goal similarity required for two episodes to share a cluster
    #[serde(default = "default_cluster_threshold")]
    pub cluster_threshold: f32,
    /// Minimum corroborating episodes before a pattern or skill is derived
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,
    /// Description similarity at which a cluster strengthens an existing
    /// pattern instead of creating a new one
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f32,
    /// Description similarity at which two patterns get cross-linked
    #[serde(default = "default_link_threshold")]
    pub link_threshold: f32,
    /// Maximum associative links kept per pattern
    #[serde(default = "default_max_related_links")]
    pub max_related_links: usize,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            trigger_threshold: default_trigger_threshold(),
            cluster_threshold: default_cluster_threshold(),
            min_cluster_size: default_min_cluster_size(),
            dedup_threshold: default_dedup_threshold(),
            link_threshold: default_link_threshold(),
            max_related_links: default_max_related_links(),
        }
    }
}

fn default_trigger_threshold() -> usize {
    10
}

fn default_cluster_threshold() -> f32 {
    0.35
}

fn default_min_cluster_size() -> usize {
    2
}

fn default_dedup_threshold() -> f32 {
    0.6
}

fn default_link_threshold() -> f32 {
    0.25
}

fn default_max_related_links() -> usize {
    5
}

/// Similarity scoring backend selection
#[derive(Debug, Clone, Deserialize)]
pub struct SimilarityConfig {
    /// Backend name: "lexical" (always available) or "embedding"
    #[serde(default = "default_similarity_provider")]
    pub provider: String,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            provider: default_similarity_provider(),
        }
    }
}

fn default_similarity_provider() -> String {
    "lexical".to_string()
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8787")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".to_string()
}
