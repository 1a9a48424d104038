//! Scenario catalog and curriculum generation.
//!
//! Thirteen episode types across four training stages, each with its phase
//! list, target behavior codes, and duration. [`ScenarioCatalog::generate`]
//! turns a type plus a difficulty and seed into a deterministic
//! [`ScenarioConfig`]; [`ScenarioCatalog::generate_curriculum`] batches
//! episodes for a whole stage.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::sprint::Story;

/// Default role slot for the training candidate.
pub const DEFAULT_TARGET_SLOT: &str = "dev_mid_backend";

/// Frozen definition of one episode type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeTypeDef {
    /// Training stage, 1-4.
    pub stage: u8,
    /// Ordered ceremony phases the episode runs.
    pub phases: &'static [&'static str],
    /// Behavioral codes the episode trains for.
    pub target_behaviors: &'static [&'static str],
    pub duration_minutes: u32,
    pub description: &'static str,
}

/// The 13 episode types, keyed by name.
pub static EPISODE_TYPES: LazyLock<BTreeMap<&'static str, EpisodeTypeDef>> = LazyLock::new(|| {
    BTreeMap::from([
        // Stage 1: Foundation
        ("elicitation", EpisodeTypeDef {
            stage: 1,
            phases: &["planning"],
            target_behaviors: &["B-01", "B-02", "B-03"],
            duration_minutes: 5,
            description: "Story elicitation and requirements clarification",
        }),
        ("decomposition", EpisodeTypeDef {
            stage: 1,
            phases: &["planning"],
            target_behaviors: &["B-04", "B-05", "B-06"],
            duration_minutes: 5,
            description: "Task decomposition and estimation",
        }),
        ("implementation", EpisodeTypeDef {
            stage: 1,
            phases: &["development"],
            target_behaviors: &["B-07", "B-08", "B-09"],
            duration_minutes: 10,
            description: "Code implementation with pairing",
        }),
        ("self_monitoring", EpisodeTypeDef {
            stage: 1,
            phases: &["development", "qa_review"],
            target_behaviors: &["B-10", "B-11"],
            duration_minutes: 8,
            description: "Self-monitoring and quality checks",
        }),
        // Stage 2: Advanced
        ("research", EpisodeTypeDef {
            stage: 2,
            phases: &["planning", "development"],
            target_behaviors: &["B-12", "B-13", "B-14"],
            duration_minutes: 10,
            description: "Technical research and spike work",
        }),
        ("triage", EpisodeTypeDef {
            stage: 2,
            phases: &["planning", "development"],
            target_behaviors: &["B-15", "B-16"],
            duration_minutes: 8,
            description: "Bug triage and prioritization under pressure",
        }),
        ("recovery", EpisodeTypeDef {
            stage: 2,
            phases: &["development", "qa_review"],
            target_behaviors: &["B-17", "B-18", "B-19"],
            duration_minutes: 10,
            description: "Recovery from disturbances (flaky tests, incidents)",
        }),
        ("scope_change", EpisodeTypeDef {
            stage: 2,
            phases: &["planning", "development"],
            target_behaviors: &["B-20", "B-21"],
            duration_minutes: 8,
            description: "Handling mid-sprint scope changes",
        }),
        // Stage 3: Expert
        ("borrowing_arrival", EpisodeTypeDef {
            stage: 3,
            phases: &["planning", "development", "retro"],
            target_behaviors: &["B-22", "B-23"],
            duration_minutes: 10,
            description: "Cross-team agent borrowing and adaptation",
        }),
        ("cross_team_dependency", EpisodeTypeDef {
            stage: 3,
            phases: &["planning", "development"],
            target_behaviors: &["B-24", "B-25"],
            duration_minutes: 10,
            description: "Cross-team dependency resolution",
        }),
        ("knowledge_handoff", EpisodeTypeDef {
            stage: 3,
            phases: &["development", "retro", "meta_learning"],
            target_behaviors: &["B-26", "B-27"],
            duration_minutes: 8,
            description: "Knowledge transfer during agent departure",
        }),
        // Stage 4: Transfer
        ("onboarding_support", EpisodeTypeDef {
            stage: 4,
            phases: &["planning", "development", "retro"],
            target_behaviors: &["B-28", "B-29"],
            duration_minutes: 10,
            description: "Supporting new team member onboarding",
        }),
        ("compensation", EpisodeTypeDef {
            stage: 4,
            phases: &["planning", "development", "qa_review", "retro"],
            target_behaviors: &["B-30"],
            duration_minutes: 10,
            description: "Compensating for team gaps after departure",
        }),
    ])
});

/// Disturbance settings generated for a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisturbanceOverrides {
    pub enabled: bool,
    #[serde(default)]
    pub frequencies: BTreeMap<String, f64>,
}

/// Per-slot agent override in a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOverride {
    #[serde(default)]
    pub is_training_candidate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seniority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_specialization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_archetype: Option<String>,
}

/// Configuration for a single training episode. Immutable after generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub episode_type: String,
    pub stage: u8,
    pub difficulty: f64,
    pub target_agent_slot: String,
    #[serde(default)]
    pub backlog_stories: Vec<Story>,
    #[serde(default)]
    pub disturbance_overrides: DisturbanceOverrides,
    #[serde(default)]
    pub agent_overrides: BTreeMap<String, AgentOverride>,
    #[serde(default)]
    pub expected_behaviors: Vec<String>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub phases: Vec<String>,
}

/// Generates scenario configurations for RL training episodes.
#[derive(Debug, Clone, Default)]
pub struct ScenarioCatalog {
    story_pool: Vec<Story>,
}

impl ScenarioCatalog {
    /// Catalog with no story pool; stories are synthesized per episode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog that samples episode stories from a pre-loaded pool instead
    /// of synthesizing them.
    pub fn with_story_pool(story_pool: Vec<Story>) -> Self {
        Self { story_pool }
    }

    /// List available episode types, optionally filtered by stage. Sorted.
    pub fn list_episode_types(&self, stage: Option<u8>) -> Vec<&'static str> {
        EPISODE_TYPES
            .iter()
            .filter(|(_, def)| stage.map(|s| def.stage == s).unwrap_or(true))
            .map(|(name, _)| *name)
            .collect()
    }

    /// Generate a scenario for an episode type. Deterministic given a seed.
    ///
    /// Unknown episode types produce a validation error enumerating the
    /// available types.
    pub fn generate(
        &self,
        episode_type: &str,
        difficulty: f64,
        target_slot: &str,
        seed: Option<u64>,
    ) -> Result<ScenarioConfig> {
        let def = EPISODE_TYPES.get(episode_type).ok_or_else(|| {
            let available = self.list_episode_types(None);
            Error::unknown_option("episode type", episode_type, &available)
        })?;

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let stories = self.stories_for_type(episode_type, difficulty, &mut rng);
        let disturbances = disturbances_for_type(episode_type, difficulty, &mut rng);

        let mut agent_overrides = BTreeMap::new();
        agent_overrides.insert(
            target_slot.to_string(),
            AgentOverride {
                is_training_candidate: true,
                ..Default::default()
            },
        );

        Ok(ScenarioConfig {
            episode_type: episode_type.to_string(),
            stage: def.stage,
            difficulty,
            target_agent_slot: target_slot.to_string(),
            backlog_stories: stories,
            disturbance_overrides: disturbances,
            agent_overrides,
            expected_behaviors: def.target_behaviors.iter().map(|s| s.to_string()).collect(),
            duration_minutes: def.duration_minutes,
            phases: def.phases.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Generate a batch of episodes for a curriculum stage, cycling through
    /// the stage's types with difficulty sampled uniformly in [0.2, 0.9).
    pub fn generate_curriculum(
        &self,
        stage: u8,
        num_episodes: usize,
        seed: Option<u64>,
    ) -> Result<Vec<ScenarioConfig>> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let types = self.list_episode_types(Some(stage));
        if types.is_empty() {
            return Ok(Vec::new());
        }

        let mut scenarios = Vec::with_capacity(num_episodes);
        for i in 0..num_episodes {
            let episode_type = types[i % types.len()];
            let difficulty = rng.gen_range(0.2..0.9);
            let child_seed = rng.gen_range(0..(1u64 << 31));
            scenarios.push(self.generate(
                episode_type,
                difficulty,
                DEFAULT_TARGET_SLOT,
                Some(child_seed),
            )?);
        }
        Ok(scenarios)
    }

    /// Stories for an episode: sampled without replacement from the pool if
    /// one is loaded, synthesized otherwise.
    fn stories_for_type(
        &self,
        episode_type: &str,
        difficulty: f64,
        rng: &mut StdRng,
    ) -> Vec<Story> {
        let num_stories = ((1.0 + difficulty * 3.0) as usize).max(1);

        if !self.story_pool.is_empty() {
            let mut pool = self.story_pool.clone();
            pool.shuffle(rng);
            pool.truncate(num_stories);
            return pool;
        }

        let complexity = if difficulty > 0.7 {
            "complex"
        } else if difficulty < 0.4 {
            "simple"
        } else {
            "moderate"
        };
        let type_tag: String = episode_type.chars().take(4).collect::<String>().to_uppercase();
        let criteria_count = 1 + (difficulty * 3.0) as usize;

        (0..num_stories)
            .map(|i| Story {
                id: format!("EP-{type_tag}-{:03}", i + 1),
                title: format!("{} task {}", title_case(episode_type), i + 1),
                description: format!("Synthetic {complexity} story for {episode_type} training"),
                story_points: (2.0 + difficulty * 6.0) as u32,
                acceptance_criteria: (0..criteria_count)
                    .map(|j| format!("Criterion {}", j + 1))
                    .collect(),
                ..Default::default()
            })
            .collect()
    }
}

/// Disturbance types relevant per episode type.
const TYPE_DISTURBANCES: &[(&str, &[&str])] = &[
    ("recovery", &["flaky_test", "production_incident", "build_failure"]),
    ("triage", &["production_incident", "scope_creep"]),
    ("scope_change", &["scope_creep", "requirement_change"]),
    ("compensation", &["agent_departure"]),
];

/// Disturbances are disabled below difficulty 0.3; above it, each relevant
/// type fires with a frequency drawn uniformly in [0.2, difficulty].
fn disturbances_for_type(
    episode_type: &str,
    difficulty: f64,
    rng: &mut StdRng,
) -> DisturbanceOverrides {
    if difficulty < 0.3 {
        return DisturbanceOverrides::default();
    }

    let mut relevant: &[&str] = TYPE_DISTURBANCES
        .iter()
        .find(|(name, _)| *name == episode_type)
        .map(|(_, types)| *types)
        .unwrap_or(&[]);
    if relevant.is_empty() && difficulty > 0.5 {
        relevant = &["flaky_test"];
    }

    let mut frequencies = BTreeMap::new();
    for disturbance_type in relevant {
        frequencies.insert(
            disturbance_type.to_string(),
            rng.gen_range(0.2..=difficulty),
        );
    }

    DisturbanceOverrides {
        enabled: !frequencies.is_empty(),
        frequencies,
    }
}

fn title_case(snake: &str) -> String {
    snake
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{behavioral_code, BEHAVIORAL_CODES};
    use pretty_assertions::assert_eq;

    #[test]
    fn thirteen_types_across_four_stages() {
        assert_eq!(EPISODE_TYPES.len(), 13);
        for stage in 1..=4u8 {
            assert!(
                EPISODE_TYPES.values().any(|d| d.stage == stage),
                "no episode types for stage {stage}"
            );
        }
    }

    #[test]
    fn every_target_behavior_exists_in_the_taxonomy() {
        for (name, def) in EPISODE_TYPES.iter() {
            for code in def.target_behaviors {
                assert!(
                    behavioral_code(code).is_some(),
                    "episode type {name} references unknown code {code}"
                );
            }
        }
    }

    #[test]
    fn every_taxonomy_category_is_an_episode_type() {
        for code in &BEHAVIORAL_CODES {
            assert!(
                EPISODE_TYPES.contains_key(code.category),
                "code {} has unknown category {}",
                code.code,
                code.category
            );
        }
    }

    #[test]
    fn list_filters_by_stage_and_sorts() {
        let catalog = ScenarioCatalog::new();
        let all = catalog.list_episode_types(None);
        assert_eq!(all.len(), 13);
        let mut sorted = all.clone();
        sorted.sort();
        assert_eq!(all, sorted);

        let stage1 = catalog.list_episode_types(Some(1));
        assert_eq!(
            stage1,
            vec!["decomposition", "elicitation", "implementation", "self_monitoring"]
        );
    }

    #[test]
    fn unknown_type_error_enumerates_available() {
        let catalog = ScenarioCatalog::new();
        let err = catalog
            .generate("nonexistent", 0.5, DEFAULT_TARGET_SLOT, Some(1))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nonexistent"));
        assert!(msg.contains("implementation"));
    }

    #[test]
    fn generation_is_deterministic_per_seed() {
        let catalog = ScenarioCatalog::new();
        let a = catalog
            .generate("recovery", 0.6, DEFAULT_TARGET_SLOT, Some(99))
            .unwrap();
        let b = catalog
            .generate("recovery", 0.6, DEFAULT_TARGET_SLOT, Some(99))
            .unwrap();
        assert_eq!(a, b);

        let c = catalog
            .generate("recovery", 0.6, DEFAULT_TARGET_SLOT, Some(100))
            .unwrap();
        // A different seed draws different disturbance frequencies.
        assert_ne!(
            a.disturbance_overrides.frequencies,
            c.disturbance_overrides.frequencies
        );
    }

    #[test]
    fn story_count_scales_with_difficulty() {
        let catalog = ScenarioCatalog::new();
        let easy = catalog
            .generate("implementation", 0.0, DEFAULT_TARGET_SLOT, Some(1))
            .unwrap();
        assert_eq!(easy.backlog_stories.len(), 1);
        let hard = catalog
            .generate("implementation", 1.0, DEFAULT_TARGET_SLOT, Some(1))
            .unwrap();
        assert_eq!(hard.backlog_stories.len(), 4);
        assert!(hard.backlog_stories[0].id.starts_with("EP-IMPL-"));
    }

    #[test]
    fn low_difficulty_disables_disturbances() {
        let catalog = ScenarioCatalog::new();
        let scenario = catalog
            .generate("recovery", 0.2, DEFAULT_TARGET_SLOT, Some(7))
            .unwrap();
        assert!(!scenario.disturbance_overrides.enabled);
        assert!(scenario.disturbance_overrides.frequencies.is_empty());
    }

    #[test]
    fn recovery_gets_its_disturbance_set() {
        let catalog = ScenarioCatalog::new();
        let scenario = catalog
            .generate("recovery", 0.6, DEFAULT_TARGET_SLOT, Some(99))
            .unwrap();
        assert!(scenario.disturbance_overrides.enabled);
        let freqs = &scenario.disturbance_overrides.frequencies;
        assert!(freqs.contains_key("flaky_test"));
        assert!(freqs.contains_key("production_incident"));
        assert!(freqs.contains_key("build_failure"));
        for freq in freqs.values() {
            assert!((0.2..=0.6).contains(freq));
        }
    }

    #[test]
    fn non_disturbance_types_get_flaky_test_above_half() {
        let catalog = ScenarioCatalog::new();
        let scenario = catalog
            .generate("implementation", 0.8, DEFAULT_TARGET_SLOT, Some(1))
            .unwrap();
        assert_eq!(
            scenario
                .disturbance_overrides
                .frequencies
                .keys()
                .map(String::as_str)
                .collect::<Vec<_>>(),
            vec!["flaky_test"]
        );
        // Between 0.3 and 0.5 nothing fires for non-listed types.
        let mild = catalog
            .generate("implementation", 0.4, DEFAULT_TARGET_SLOT, Some(1))
            .unwrap();
        assert!(!mild.disturbance_overrides.enabled);
    }

    #[test]
    fn target_slot_is_marked_training_candidate() {
        let catalog = ScenarioCatalog::new();
        let scenario = catalog
            .generate("elicitation", 0.5, "qa_lead", Some(3))
            .unwrap();
        assert!(scenario.agent_overrides["qa_lead"].is_training_candidate);
    }

    #[test]
    fn story_pool_is_sampled_without_replacement() {
        let pool: Vec<Story> = (0..10)
            .map(|i| Story::new(format!("POOL-{i}"), format!("Pool story {i}")))
            .collect();
        let catalog = ScenarioCatalog::with_story_pool(pool);
        let scenario = catalog
            .generate("implementation", 1.0, DEFAULT_TARGET_SLOT, Some(5))
            .unwrap();
        assert_eq!(scenario.backlog_stories.len(), 4);
        let mut ids: Vec<&str> = scenario
            .backlog_stories
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn curriculum_cycles_types_and_is_deterministic() {
        let catalog = ScenarioCatalog::new();
        let batch = catalog.generate_curriculum(1, 8, Some(42)).unwrap();
        assert_eq!(batch.len(), 8);
        // Four stage-1 types, cycled twice.
        assert_eq!(batch[0].episode_type, batch[4].episode_type);
        for scenario in &batch {
            assert!((0.2..0.9).contains(&scenario.difficulty));
            assert_eq!(scenario.stage, 1);
        }
        let again = catalog.generate_curriculum(1, 8, Some(42)).unwrap();
        assert_eq!(batch, again);

        assert!(catalog.generate_curriculum(9, 5, Some(1)).unwrap().is_empty());
    }
}
