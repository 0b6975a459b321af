//! Consolidation pipeline
//!
//! Periodically promotes raw episodic traces into durable knowledge:
//! clusters of corroborating successful episodes become procedural
//! skills, recurring failure modes become anti-patterns, recurring
//! success approaches become success-patterns. Consumed episodes are
//! archived (never deleted) and the namespace watermark advances only
//! after every derived entity is durably written, so a crashed run can
//! simply be re-run. Provenance-overlap checks keep re-processing from
//! creating duplicate patterns.

pub mod similarity;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ConsolidationConfig, ImportanceConfig};
use crate::error::Result;
use crate::memory::importance::initial_importance;
use crate::memory::types::{
    CATEGORY_ANTI_PATTERN, CATEGORY_SUCCESS_PATTERN, EntityKind, EpisodeTrace, MemoryEntity,
    Outcome, ProceduralSkill, SemanticPattern,
};
use crate::storage::{EntityFilter, EntityStore};
use similarity::Similarity;

/// Statistics from one consolidation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidationResult {
    /// False when the trigger threshold was not reached
    pub ran: bool,
    /// Unconsolidated episodes examined
    pub episodes_seen: usize,
    /// Clusters meeting the minimum corroboration size
    pub clusters: usize,
    pub patterns_created: usize,
    pub patterns_strengthened: usize,
    pub skills_created: usize,
    pub skills_strengthened: usize,
    pub episodes_archived: usize,
    /// Watermark after the run
    pub watermark: Option<DateTime<Utc>>,
    /// Ids of patterns created or strengthened by this run
    pub pattern_ids: Vec<Uuid>,
}

/// Runs the episodic-to-semantic consolidation pass for one namespace.
pub struct Consolidator<'a> {
    store: &'a EntityStore,
    similarity: &'a dyn Similarity,
    config: &'a ConsolidationConfig,
    importance: &'a ImportanceConfig,
}

struct Cluster {
    outcome: Outcome,
    members: Vec<EpisodeTrace>,
}

impl<'a> Consolidator<'a> {
    pub fn new(
        store: &'a EntityStore,
        similarity: &'a dyn Similarity,
        config: &'a ConsolidationConfig,
        importance: &'a ImportanceConfig,
    ) -> Self {
        Self {
            store,
            similarity,
            config,
            importance,
        }
    }

    /// True once enough new episodes accumulated since the last run.
    pub fn should_run(&self, namespace: &str) -> Result<bool> {
        Ok(self.store.read_meta(namespace)?.new_episodes >= self.config.trigger_threshold)
    }

    /// Run one consolidation pass. `force` ignores the trigger threshold.
    ///
    /// Serialized per namespace by the consolidation lock; episode writes
    /// are never blocked because they use the per-kind write locks.
    pub fn run(&self, namespace: &str, force: bool) -> Result<ConsolidationResult> {
        let _lock = self.store.consolidation_lock(namespace)?;

        let meta = self.store.read_meta(namespace)?;
        let mut result = ConsolidationResult {
            watermark: meta.watermark,
            ..ConsolidationResult::default()
        };

        if !force && meta.new_episodes < self.config.trigger_threshold {
            tracing::debug!(
                namespace = %namespace,
                new_episodes = meta.new_episodes,
                threshold = self.config.trigger_threshold,
                "Consolidation threshold not reached"
            );
            return Ok(result);
        }
        result.ran = true;

        let mut filter = EntityFilter::new();
        if let Some(watermark) = meta.watermark {
            filter = filter.created_after(watermark);
        }
        let episodes: Vec<EpisodeTrace> = self
            .store
            .list(namespace, EntityKind::Episode, &filter)?
            .into_iter()
            .filter_map(|e| match e {
                MemoryEntity::Episode(trace) => Some(trace),
                _ => None,
            })
            .collect();
        result.episodes_seen = episodes.len();

        if episodes.is_empty() {
            tracing::debug!(namespace = %namespace, "No unconsolidated episodes");
            return Ok(result);
        }
        let new_watermark = episodes.iter().map(|e| e.created_at).max();

        let mut patterns = self.load_patterns(namespace)?;
        let mut skills = self.load_skills(namespace)?;
        let mut consumed: Vec<EpisodeTrace> = Vec::new();

        for cluster in self.cluster(episodes) {
            if cluster.members.len() < self.config.min_cluster_size {
                continue;
            }
            result.clusters += 1;

            match cluster.outcome {
                Outcome::Failure => {
                    self.upsert_pattern(
                        namespace,
                        CATEGORY_ANTI_PATTERN,
                        &cluster,
                        &mut patterns,
                        &mut result,
                    )?;
                }
                Outcome::Success => {
                    self.upsert_pattern(
                        namespace,
                        CATEGORY_SUCCESS_PATTERN,
                        &cluster,
                        &mut patterns,
                        &mut result,
                    )?;
                    if let Some(steps) = shared_action_sequence(&cluster.members) {
                        self.upsert_skill(namespace, &cluster, steps, &mut skills, &mut result)?;
                    }
                }
                // Partial outcomes corroborate nothing on their own.
                Outcome::Partial => continue,
            }

            consumed.extend(cluster.members);
        }

        // Retire consumed episodes to cold storage. They stay on disk and
        // retrievable; they just never feed another clustering pass.
        for mut episode in consumed {
            episode.archived = true;
            self.store.put(&MemoryEntity::Episode(episode))?;
            result.episodes_archived += 1;
        }

        // Commit point: everything derived is durable, advance the
        // watermark. A crash before this line re-runs the same window.
        self.store.update_meta(namespace, |meta| {
            meta.watermark = new_watermark;
            meta.new_episodes = 0;
        })?;
        result.watermark = new_watermark;

        tracing::info!(
            namespace = %namespace,
            episodes = result.episodes_seen,
            clusters = result.clusters,
            patterns_created = result.patterns_created,
            skills_created = result.skills_created,
            "Consolidation run complete"
        );
        Ok(result)
    }

    fn load_patterns(&self, namespace: &str) -> Result<Vec<SemanticPattern>> {
        Ok(self
            .store
            .list(namespace, EntityKind::Pattern, &EntityFilter::new())?
            .into_iter()
            .filter_map(|e| match e {
                MemoryEntity::Pattern(p) => Some(p),
                _ => None,
            })
            .collect())
    }

    fn load_skills(&self, namespace: &str) -> Result<Vec<ProceduralSkill>> {
        Ok(self
            .store
            .list(namespace, EntityKind::Skill, &EntityFilter::new())?
            .into_iter()
            .filter_map(|e| match e {
                MemoryEntity::Skill(s) => Some(s),
                _ => None,
            })
            .collect())
    }

    /// Greedy single-pass clustering by goal similarity and outcome.
    /// Episodes arrive sorted by creation time, so the result is
    /// deterministic for a given store state.
    fn cluster(&self, episodes: Vec<EpisodeTrace>) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = Vec::new();
        for episode in episodes {
            let found = clusters.iter().position(|c| {
                c.outcome == episode.outcome
                    && self.similarity.score(&c.members[0].goal, &episode.goal)
                        >= self.config.cluster_threshold
            });
            match found {
                Some(i) => clusters[i].members.push(episode),
                None => clusters.push(Cluster {
                    outcome: episode.outcome,
                    members: vec![episode],
                }),
            }
        }
        clusters
    }

    /// Create a pattern for the cluster, or strengthen an existing one.
    ///
    /// An existing live pattern matches when its provenance overlaps the
    /// cluster (the idempotent re-run case) or its description is close
    /// enough lexically. Matching keeps re-clustering from duplicating.
    fn upsert_pattern(
        &self,
        namespace: &str,
        category: &str,
        cluster: &Cluster,
        patterns: &mut Vec<SemanticPattern>,
        result: &mut ConsolidationResult,
    ) -> Result<()> {
        let episode_ids: Vec<Uuid> = cluster.members.iter().map(|e| e.id).collect();
        let description = describe_cluster(category, cluster);

        let matched = patterns.iter_mut().find(|p| {
            p.deprecated_by.is_none()
                && p.category == category
                && (p.provenance.iter().any(|id| episode_ids.contains(id))
                    || self.similarity.score(&p.description, &description)
                        >= self.config.dedup_threshold)
        });

        if let Some(pattern) = matched {
            pattern.corroborate(&episode_ids);
            let refreshed =
                initial_importance(&MemoryEntity::Pattern(pattern.clone()), self.importance);
            pattern.importance = pattern.importance.max(refreshed);
            self.store.put(&MemoryEntity::Pattern(pattern.clone()))?;
            result.patterns_strengthened += 1;
            result.pattern_ids.push(pattern.id);
            return Ok(());
        }

        let mut pattern = SemanticPattern::new(namespace, category, description);
        pattern.corroborate(&episode_ids);
        pattern.importance =
            initial_importance(&MemoryEntity::Pattern(pattern.clone()), self.importance);

        self.cross_link(&mut pattern, patterns)?;

        self.store.put(&MemoryEntity::Pattern(pattern.clone()))?;
        result.patterns_created += 1;
        result.pattern_ids.push(pattern.id);
        patterns.push(pattern);
        Ok(())
    }

    /// Associative Zettelkasten-style linking: a new pattern and any
    /// existing live pattern with the same category or a lexically close
    /// description reference each other by id. Links are ids resolved on
    /// demand, so cycles are harmless.
    fn cross_link(
        &self,
        pattern: &mut SemanticPattern,
        existing: &mut [SemanticPattern],
    ) -> Result<()> {
        for other in existing.iter_mut() {
            if other.deprecated_by.is_some() {
                continue;
            }
            let related = other.category == pattern.category
                || self.similarity.score(&other.description, &pattern.description)
                    >= self.config.link_threshold;
            if !related {
                continue;
            }
            pattern.add_related(other.id, self.config.max_related_links);
            let before = other.related.len();
            other.add_related(pattern.id, self.config.max_related_links);
            if other.related.len() != before {
                self.store.put(&MemoryEntity::Pattern(other.clone()))?;
            }
        }
        Ok(())
    }

    fn upsert_skill(
        &self,
        namespace: &str,
        cluster: &Cluster,
        steps: Vec<String>,
        skills: &mut Vec<ProceduralSkill>,
        result: &mut ConsolidationResult,
    ) -> Result<()> {
        let triggers: Vec<String> = {
            let mut goals: Vec<String> = cluster.members.iter().map(|e| e.goal.clone()).collect();
            goals.sort();
            goals.dedup();
            goals
        };

        if let Some(skill) = skills.iter_mut().find(|s| s.steps == steps) {
            for _ in &cluster.members {
                skill.record_invocation(true);
            }
            for trigger in &triggers {
                if !skill.triggers.contains(trigger) {
                    skill.triggers.push(trigger.clone());
                }
            }
            let refreshed =
                initial_importance(&MemoryEntity::Skill(skill.clone()), self.importance);
            skill.importance = skill.importance.max(refreshed);
            self.store.put(&MemoryEntity::Skill(skill.clone()))?;
            result.skills_strengthened += 1;
            return Ok(());
        }

        let mut skill = ProceduralSkill::new(namespace, skill_name(&cluster.members[0].goal), steps);
        skill.triggers = triggers;
        for _ in &cluster.members {
            skill.record_invocation(true);
        }
        skill.importance = initial_importance(&MemoryEntity::Skill(skill.clone()), self.importance);

        self.store.put(&MemoryEntity::Skill(skill.clone()))?;
        result.skills_created += 1;
        skills.push(skill);
        Ok(())
    }
}

/// The action sequence shared by every member, if they agree exactly.
fn shared_action_sequence(members: &[EpisodeTrace]) -> Option<Vec<String>> {
    let first = &members[0].actions;
    if first.is_empty() {
        return None;
    }
    members
        .iter()
        .all(|e| &e.actions == first)
        .then(|| first.clone())
}

fn describe_cluster(category: &str, cluster: &Cluster) -> String {
    let representative = &cluster.members[0];
    match category {
        CATEGORY_ANTI_PATTERN => {
            let mut description = format!(
                "Recurring failure on tasks like \"{}\"",
                representative.goal
            );
            if let Some(detail) = cluster
                .members
                .iter()
                .find_map(|e| e.error_detail.as_deref().filter(|d| !d.is_empty()))
            {
                description.push_str(&format!("; typical error: {detail}"));
            }
            description
        }
        _ => format!(
            "Reliable approach for tasks like \"{}\" ({} steps)",
            representative.goal,
            representative.actions.len()
        ),
    }
}

fn skill_name(goal: &str) -> String {
    const MAX_LEN: usize = 60;
    if goal.chars().count() <= MAX_LEN {
        goal.to_string()
    } else {
        goal.chars().take(MAX_LEN).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use similarity::LexicalSimilarity;

    fn make_store() -> (tempfile::TempDir, EntityStore, Config) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_path_buf();
        let store = EntityStore::open(&config).unwrap();
        (dir, store, config)
    }

    fn put_episode(
        store: &EntityStore,
        namespace: &str,
        goal: &str,
        actions: &[&str],
        outcome: Outcome,
        error: Option<&str>,
    ) -> EpisodeTrace {
        let mut trace = EpisodeTrace::new(
            namespace,
            "task",
            "builder",
            goal,
            actions.iter().map(|s| s.to_string()).collect(),
            outcome,
        );
        trace.error_detail = error.map(String::from);
        store.put(&MemoryEntity::Episode(trace.clone())).unwrap();
        trace
    }

    fn consolidate(store: &EntityStore, config: &Config, namespace: &str) -> ConsolidationResult {
        let sim = LexicalSimilarity;
        Consolidator::new(store, &sim, &config.consolidation, &config.importance)
            .run(namespace, true)
            .unwrap()
    }

    #[test]
    fn test_failure_cluster_becomes_anti_pattern() {
        let (_dir, store, config) = make_store();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let trace = put_episode(
                &store,
                "proj1",
                "migrate database schema",
                &["edit migration", "run migrate"],
                Outcome::Failure,
                Some("column already exists"),
            );
            ids.push(trace.id);
        }

        let result = consolidate(&store, &config, "proj1");
        assert!(result.ran);
        assert_eq!(result.patterns_created, 1);
        assert_eq!(result.episodes_archived, 3);

        let patterns = store
            .list("proj1", EntityKind::Pattern, &EntityFilter::new())
            .unwrap();
        assert_eq!(patterns.len(), 1);
        let MemoryEntity::Pattern(pattern) = &patterns[0] else {
            panic!("expected pattern");
        };
        assert_eq!(pattern.category, CATEGORY_ANTI_PATTERN);
        assert!(pattern.confidence >= 0.5);
        assert_eq!(pattern.provenance.len(), 3);
        for id in &ids {
            assert!(pattern.provenance.contains(id));
        }
    }

    #[test]
    fn test_success_cluster_becomes_skill_and_pattern() {
        let (_dir, store, config) = make_store();
        for _ in 0..2 {
            put_episode(
                &store,
                "proj1",
                "add unit tests for parser",
                &["read parser", "write tests", "run tests"],
                Outcome::Success,
                None,
            );
        }

        let result = consolidate(&store, &config, "proj1");
        assert_eq!(result.skills_created, 1);
        assert_eq!(result.patterns_created, 1);

        let skills = store
            .list("proj1", EntityKind::Skill, &EntityFilter::new())
            .unwrap();
        let MemoryEntity::Skill(skill) = &skills[0] else {
            panic!("expected skill");
        };
        assert_eq!(skill.steps.len(), 3);
        assert_eq!(skill.usage_count, 2);
        assert_eq!(skill.success_rate, 1.0);
        assert_eq!(skill.triggers, vec!["add unit tests for parser".to_string()]);
    }

    #[test]
    fn test_singleton_clusters_produce_nothing() {
        let (_dir, store, config) = make_store();
        put_episode(&store, "proj1", "alpha work", &["a"], Outcome::Success, None);
        put_episode(&store, "proj1", "totally different beta", &["b"], Outcome::Failure, None);

        let result = consolidate(&store, &config, "proj1");
        assert!(result.ran);
        assert_eq!(result.clusters, 0);
        assert_eq!(result.patterns_created, 0);
        assert_eq!(result.episodes_archived, 0);
        // Watermark still advances past examined episodes.
        assert!(result.watermark.is_some());
    }

    #[test]
    fn test_mixed_outcomes_do_not_cluster_together() {
        let (_dir, store, config) = make_store();
        put_episode(&store, "proj1", "deploy service", &["a"], Outcome::Success, None);
        put_episode(&store, "proj1", "deploy service", &["a"], Outcome::Failure, None);

        let result = consolidate(&store, &config, "proj1");
        assert_eq!(result.clusters, 0, "same goal, different outcome");
    }

    #[test]
    fn test_second_run_is_a_noop() {
        let (_dir, store, config) = make_store();
        for _ in 0..3 {
            put_episode(
                &store,
                "proj1",
                "flaky websocket reconnect",
                &["inspect logs"],
                Outcome::Failure,
                Some("connection reset"),
            );
        }

        let first = consolidate(&store, &config, "proj1");
        assert_eq!(first.patterns_created, 1);

        let second = consolidate(&store, &config, "proj1");
        assert!(second.ran);
        assert_eq!(second.episodes_seen, 0);
        assert_eq!(second.patterns_created, 0);
    }

    #[test]
    fn test_crash_rerun_does_not_duplicate_patterns() {
        let (_dir, store, config) = make_store();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let trace = put_episode(
                &store,
                "proj1",
                "broken cache invalidation",
                &["trace cache"],
                Outcome::Failure,
                Some("stale entry served"),
            );
            ids.push(trace.id);
        }

        let first = consolidate(&store, &config, "proj1");
        assert_eq!(first.patterns_created, 1);

        // Simulate a crash after the derived writes but before the
        // commit point: watermark rolled back, episodes not archived.
        store
            .update_meta("proj1", |meta| {
                meta.watermark = None;
            })
            .unwrap();
        for id in &ids {
            let MemoryEntity::Episode(mut trace) =
                store.get("proj1", EntityKind::Episode, *id).unwrap()
            else {
                panic!("expected episode");
            };
            trace.archived = false;
            store.put(&MemoryEntity::Episode(trace)).unwrap();
        }

        let rerun = consolidate(&store, &config, "proj1");
        assert_eq!(rerun.patterns_created, 0);
        assert_eq!(rerun.patterns_strengthened, 1);

        let patterns = store
            .list("proj1", EntityKind::Pattern, &EntityFilter::new())
            .unwrap();
        assert_eq!(patterns.len(), 1, "re-clustering must not duplicate");
        let MemoryEntity::Pattern(pattern) = &patterns[0] else {
            panic!("expected pattern");
        };
        let mut provenance = pattern.provenance.clone();
        provenance.sort();
        ids.sort();
        assert_eq!(provenance, ids, "provenance set unchanged by re-run");
    }

    #[test]
    fn test_threshold_gates_unforced_runs() {
        let (_dir, store, mut config) = make_store();
        config.consolidation.trigger_threshold = 5;
        put_episode(&store, "proj1", "one episode", &["a"], Outcome::Success, None);

        let sim = LexicalSimilarity;
        let consolidator =
            Consolidator::new(&store, &sim, &config.consolidation, &config.importance);
        assert!(!consolidator.should_run("proj1").unwrap());

        let result = consolidator.run("proj1", false).unwrap();
        assert!(!result.ran);

        let forced = consolidator.run("proj1", true).unwrap();
        assert!(forced.ran);
    }

    #[test]
    fn test_related_patterns_cross_link() {
        let (_dir, store, config) = make_store();

        for _ in 0..2 {
            put_episode(
                &store,
                "proj1",
                "timeout fetching user profile",
                &["check network"],
                Outcome::Failure,
                Some("deadline exceeded"),
            );
        }
        consolidate(&store, &config, "proj1");

        // A second, lexically distinct failure family in the same
        // category should link to the first one.
        for _ in 0..2 {
            put_episode(
                &store,
                "proj1",
                "migration script ordering broken",
                &["inspect migrations"],
                Outcome::Failure,
                Some("out of order"),
            );
        }
        consolidate(&store, &config, "proj1");

        let patterns: Vec<SemanticPattern> = store
            .list("proj1", EntityKind::Pattern, &EntityFilter::new())
            .unwrap()
            .into_iter()
            .filter_map(|e| match e {
                MemoryEntity::Pattern(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(patterns.len(), 2);
        assert!(patterns.iter().all(|p| p.related.len() == 1));
        assert_eq!(patterns[0].related[0], patterns[1].id);
        assert_eq!(patterns[1].related[0], patterns[0].id);
    }

    #[test]
    fn test_namespace_isolation_of_consolidation() {
        let (_dir, store, config) = make_store();
        for _ in 0..2 {
            put_episode(&store, "proj-a", "shared goal text", &["x"], Outcome::Failure, None);
        }
        put_episode(&store, "proj-b", "shared goal text", &["x"], Outcome::Failure, None);

        consolidate(&store, &config, "proj-a");

        let b_patterns = store
            .list("proj-b", EntityKind::Pattern, &EntityFilter::new())
            .unwrap();
        assert!(b_patterns.is_empty());
        let b_episodes = store
            .list("proj-b", EntityKind::Episode, &EntityFilter::new())
            .unwrap();
        assert_eq!(b_episodes.len(), 1, "other namespace untouched");
    }

    #[test]
    fn test_shared_action_sequence() {
        let make = |actions: &[&str]| {
            EpisodeTrace::new(
                "ns",
                "t",
                "r",
                "g",
                actions.iter().map(|s| s.to_string()).collect(),
                Outcome::Success,
            )
        };

        let same = vec![make(&["a", "b"]), make(&["a", "b"])];
        assert_eq!(
            shared_action_sequence(&same),
            Some(vec!["a".to_string(), "b".to_string()])
        );

        let different = vec![make(&["a", "b"]), make(&["a", "c"])];
        assert_eq!(shared_action_sequence(&different), None);

        let empty = vec![make(&[]), make(&[])];
        assert_eq!(shared_action_sequence(&empty), None);
    }
}
