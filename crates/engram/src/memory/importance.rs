//! Importance scoring, decay, and retrieval boost
//!
//! Every entity carries an importance score in [0.01, 1.0]. Scores are
//! assigned at write time, decay exponentially with a per-kind half-life,
//! and get boosted toward 1.0 each time retrieval selects the entity.
//! Decay is evaluated lazily at read time; no background sweep exists.

use chrono::{DateTime, Utc};

use crate::config::ImportanceConfig;
use crate::memory::types::{IMPORTANCE_FLOOR, MemoryEntity, Outcome};

/// Compute the initial importance for a freshly written entity.
///
/// Success episodes score above failures, except that failures carrying
/// error detail get a learning bonus so lessons are not lost to decay
/// first. Patterns and skills earn a corroboration bonus per supporting
/// episode or recorded invocation.
pub fn initial_importance(entity: &MemoryEntity, config: &ImportanceConfig) -> f32 {
    let raw = match entity {
        MemoryEntity::Episode(e) => {
            let mut score = match e.outcome {
                Outcome::Success => config.success_base,
                Outcome::Partial => config.partial_base,
                Outcome::Failure => config.failure_base,
            };
            if e.error_detail.as_deref().is_some_and(|d| !d.is_empty()) {
                score += config.error_detail_bonus;
                if e.outcome == Outcome::Failure {
                    score += config.learning_bonus;
                }
            }
            score
        }
        MemoryEntity::Pattern(p) => {
            0.4 + config.corroboration_bonus * p.provenance.len() as f32
        }
        MemoryEntity::Skill(s) => 0.5 + config.corroboration_bonus * s.usage_count as f32,
    };
    raw.clamp(IMPORTANCE_FLOOR, 1.0)
}

/// Importance after lazy exponential decay, floored at 0.01.
///
/// `importance(t) = stored * 0.5^(age_days / half_life)` where age is
/// measured from the moment the stored score was last materialized
/// (creation, or the most recent retrieval boost). A pure function of
/// the record and `now`, so two reads at the same instant agree.
pub fn decayed_importance(
    entity: &MemoryEntity,
    now: DateTime<Utc>,
    config: &ImportanceConfig,
) -> f32 {
    decay(
        entity.importance(),
        entity.last_accessed(),
        now,
        config.half_life_days(entity.kind()),
    )
}

/// Decay a raw score from `since` to `now` with the given half-life.
pub fn decay(stored: f32, since: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f32) -> f32 {
    if half_life_days <= 0.0 {
        return stored.clamp(IMPORTANCE_FLOOR, 1.0);
    }
    let age_days = (now - since).num_seconds().max(0) as f32 / 86_400.0;
    let decayed = stored * 0.5_f32.powf(age_days / half_life_days);
    decayed.clamp(IMPORTANCE_FLOOR, 1.0)
}

/// Apply one retrieval boost: materialize the decayed score, then add a
/// fixed fraction of the remaining headroom to 1.0, and record the
/// access. Idempotent per logical access because the caller invokes it
/// exactly once per selected entity per retrieval.
pub fn apply_boost(entity: &mut MemoryEntity, now: DateTime<Utc>, config: &ImportanceConfig) {
    let current = decayed_importance(entity, now, config);
    let boosted = current + config.boost * (1.0 - current);
    entity.set_importance(boosted);
    entity.mark_accessed(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{EpisodeTrace, ProceduralSkill, SemanticPattern};
    use chrono::Duration;

    fn episode(outcome: Outcome, error: Option<&str>) -> MemoryEntity {
        let mut trace = EpisodeTrace::new("ns", "t", "builder", "goal", vec![], outcome);
        trace.error_detail = error.map(String::from);
        MemoryEntity::Episode(trace)
    }

    #[test]
    fn test_success_scores_above_plain_failure() {
        let config = ImportanceConfig::default();
        let success = initial_importance(&episode(Outcome::Success, None), &config);
        let failure = initial_importance(&episode(Outcome::Failure, None), &config);
        assert!(success > failure);
    }

    #[test]
    fn test_failure_with_lesson_gets_floor_bonus() {
        let config = ImportanceConfig::default();
        let plain = initial_importance(&episode(Outcome::Failure, None), &config);
        let with_lesson =
            initial_importance(&episode(Outcome::Failure, Some("timeout in CI")), &config);
        assert!(
            with_lesson > plain,
            "failures carrying error detail must not be forgotten first"
        );
        // But learning from failure still ranks below clean success.
        let success = initial_importance(&episode(Outcome::Success, None), &config);
        assert!(with_lesson < success);
    }

    #[test]
    fn test_empty_error_detail_earns_nothing() {
        let config = ImportanceConfig::default();
        let empty = initial_importance(&episode(Outcome::Failure, Some("")), &config);
        let none = initial_importance(&episode(Outcome::Failure, None), &config);
        assert_eq!(empty, none);
    }

    #[test]
    fn test_corroboration_raises_pattern_score() {
        let config = ImportanceConfig::default();

        let lone = MemoryEntity::Pattern(SemanticPattern::new("ns", "anti-pattern", "d"));
        let mut corroborated = SemanticPattern::new("ns", "anti-pattern", "d");
        corroborated.provenance = (0..4).map(|_| uuid::Uuid::new_v4()).collect();
        let corroborated = MemoryEntity::Pattern(corroborated);

        assert!(initial_importance(&corroborated, &config) > initial_importance(&lone, &config));
    }

    #[test]
    fn test_initial_importance_in_bounds() {
        let config = ImportanceConfig::default();
        let mut skill = ProceduralSkill::new("ns", "s", vec![]);
        skill.usage_count = 1000;
        let entity = MemoryEntity::Skill(skill);
        let score = initial_importance(&entity, &config);
        assert!((IMPORTANCE_FLOOR..=1.0).contains(&score));
    }

    #[test]
    fn test_decay_halves_at_half_life() {
        let now = Utc::now();
        let since = now - Duration::days(7);
        let decayed = decay(0.8, since, now, 7.0);
        assert!((decayed - 0.4).abs() < 0.01);
    }

    #[test]
    fn test_decay_never_reaches_zero() {
        let now = Utc::now();
        let since = now - Duration::days(10_000);
        let decayed = decay(1.0, since, now, 7.0);
        assert_eq!(decayed, IMPORTANCE_FLOOR);
    }

    #[test]
    fn test_decay_is_idempotent_at_fixed_instant() {
        let config = ImportanceConfig::default();
        let entity = episode(Outcome::Success, None);
        let now = Utc::now() + Duration::days(3);

        let first = decayed_importance(&entity, now, &config);
        let second = decayed_importance(&entity, now, &config);
        assert_eq!(first, second);
    }

    #[test]
    fn test_skills_decay_slower_than_episodes() {
        let config = ImportanceConfig::default();
        let now = Utc::now();

        let mut trace = EpisodeTrace::new("ns", "t", "r", "g", vec![], Outcome::Success);
        trace.importance = 0.8;
        trace.created_at = now - Duration::days(30);
        trace.last_accessed = trace.created_at;
        let episode = MemoryEntity::Episode(trace);

        let mut skill = ProceduralSkill::new("ns", "s", vec![]);
        skill.importance = 0.8;
        skill.created_at = now - Duration::days(30);
        skill.last_accessed = skill.created_at;
        let skill = MemoryEntity::Skill(skill);

        assert!(
            decayed_importance(&skill, now, &config) > decayed_importance(&episode, now, &config)
        );
    }

    #[test]
    fn test_boost_is_monotonic_and_bounded() {
        let config = ImportanceConfig::default();
        let mut entity = episode(Outcome::Success, None);
        let now = Utc::now();

        let before = decayed_importance(&entity, now, &config);
        apply_boost(&mut entity, now, &config);
        let after = entity.importance();

        assert!(after > before, "boost strictly increases below 1.0");
        assert!(after <= 1.0);
        assert_eq!(entity.access_count(), 1);
        assert_eq!(entity.last_accessed(), now);
    }

    #[test]
    fn test_repeated_boosts_stay_in_bounds() {
        let config = ImportanceConfig::default();
        let mut entity = episode(Outcome::Success, None);
        let now = Utc::now();

        for _ in 0..100 {
            apply_boost(&mut entity, now, &config);
            let score = entity.importance();
            assert!((IMPORTANCE_FLOOR..=1.0).contains(&score));
        }
        // Asymptotic approach to 1.0 without overshooting.
        assert!(entity.importance() > 0.99);
    }

    #[test]
    fn test_boost_at_ceiling_is_a_fixed_point() {
        let config = ImportanceConfig::default();
        let mut entity = episode(Outcome::Success, None);
        entity.set_importance(1.0);
        let now = Utc::now();

        apply_boost(&mut entity, now, &config);
        assert_eq!(entity.importance(), 1.0);
    }
}
