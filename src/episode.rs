//! Single-call episode execution.
//!
//! [`EpisodeRunner`] composes the scenario catalog, config builder, sprint
//! fixture, action executor, phase runner, observation extractor, behavioral
//! scorer, and reward calculator into one call. Each episode gets a fresh
//! fixture and its own workspace subdirectory, so parallel episodes never
//! share state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

use crate::action::{Action, ActionExecutor};
use crate::checkpoint::CheckpointManager;
use crate::config::ExperimentConfigBuilder;
use crate::error::Result;
use crate::observation::{Observation, ObservationExtractor};
use crate::phase::{PhaseResult, PhaseRunner};
use crate::reward::{RewardCalculator, RewardSignal, RewardWeights, DEFAULT_EXPECTED_VELOCITY};
use crate::scenario::{ScenarioCatalog, ScenarioConfig, DEFAULT_TARGET_SLOT};
use crate::sprint::{
    AgentConfig, Backlog, SharedContextDb, SprintAgent, SprintManager, SprintRecord,
};
use crate::taxonomy::BehavioralScorer;
use crate::tracer::Decision;

/// Options for a single episode run.
#[derive(Debug, Clone)]
pub struct EpisodeOptions {
    /// 0.0 (easy) to 1.0 (hard).
    pub difficulty: f64,
    /// Role slot of the training candidate.
    pub target_slot: String,
    /// RNG seed for deterministic scenario generation.
    pub seed: Option<u64>,
    /// Actions executed against the fixture before any phase runs.
    pub actions: Vec<Action>,
    /// Save a checkpoint after every phase.
    pub checkpoint_every_phase: bool,
}

impl Default for EpisodeOptions {
    fn default() -> Self {
        Self {
            difficulty: 0.5,
            target_slot: DEFAULT_TARGET_SLOT.to_string(),
            seed: None,
            actions: Vec::new(),
            checkpoint_every_phase: false,
        }
    }
}

/// Complete result of an episode execution.
///
/// Episodes always terminate cleanly: a failing phase stops the sequence but
/// the observation, traces, and reward are still produced over what exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeResult {
    pub episode_id: String,
    pub episode_type: String,
    pub stage: u8,
    pub difficulty: f64,
    pub phase_results: Vec<PhaseResult>,
    pub final_observation: Observation,
    pub reward: RewardSignal,
    pub behavioral_score: f64,
    pub behaviors_detected: Vec<String>,
    /// Agent id → full decision trace.
    pub decision_traces: BTreeMap<String, Vec<Decision>>,
    /// Synthetic sprint result built from phase artifacts.
    pub sprint_result: SprintRecord,
    pub total_duration_seconds: f64,
    pub terminated: bool,
    pub truncated: bool,
}

/// End-to-end episode harness.
pub struct EpisodeRunner {
    catalog: ScenarioCatalog,
    reward: RewardCalculator,
    scorer: BehavioralScorer,
    checkpoint_mgr: CheckpointManager,
    workspace_root: PathBuf,
}

impl Default for EpisodeRunner {
    fn default() -> Self {
        Self {
            catalog: ScenarioCatalog::new(),
            reward: RewardCalculator::default(),
            scorer: BehavioralScorer::new(),
            checkpoint_mgr: CheckpointManager::default(),
            workspace_root: PathBuf::from("/tmp/sprintgym-episodes"),
        }
    }
}

impl EpisodeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom scenario catalog (e.g. one with a story pool).
    pub fn with_catalog(mut self, catalog: ScenarioCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Override the reward channel weights.
    pub fn with_reward_weights(mut self, weights: RewardWeights) -> Self {
        self.reward = RewardCalculator::new(weights);
        self
    }

    /// Store checkpoints under a custom directory.
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_mgr = CheckpointManager::new(dir);
        self
    }

    /// Place episode workspaces under a custom root.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Run a full episode by type. See [`ScenarioCatalog::generate`] for the
    /// scenario parameters.
    pub async fn run_episode(
        &self,
        episode_type: &str,
        options: EpisodeOptions,
    ) -> Result<EpisodeResult> {
        let scenario = self.catalog.generate(
            episode_type,
            options.difficulty,
            &options.target_slot,
            options.seed,
        )?;
        self.run_scenario(scenario, options).await
    }

    /// Run a full episode from a pre-generated scenario.
    pub async fn run_scenario(
        &self,
        scenario: ScenarioConfig,
        options: EpisodeOptions,
    ) -> Result<EpisodeResult> {
        let episode_id = format!("ep-{}", &Uuid::new_v4().simple().to_string()[..8]);
        let start = Instant::now();
        tracing::info!(
            %episode_id,
            episode_type = %scenario.episode_type,
            difficulty = scenario.difficulty,
            "starting episode"
        );

        let mut sm = self.setup_sprint_manager(&scenario, &episode_id).await?;

        if !options.actions.is_empty() {
            let mut executor = ActionExecutor::new(&mut sm);
            let results = executor.execute_batch(&options.actions).await;
            for result in &results {
                if !result.success {
                    tracing::warn!(
                        %episode_id,
                        action = result.action,
                        reason = result.reason.as_deref().unwrap_or(""),
                        "pre-phase action failed"
                    );
                }
            }
        }

        let mut phase_results: Vec<PhaseResult> = Vec::new();
        for phase in &scenario.phases {
            let result = {
                let mut runner = PhaseRunner::new(&mut sm);
                runner.run_phase(phase, 1, None).await?
            };
            let failed = result.error.is_some();
            phase_results.push(result);
            if options.checkpoint_every_phase {
                self.checkpoint_mgr.save(&episode_id, &sm, 1, phase).await?;
            }
            if failed {
                break;
            }
        }

        let final_phase = phase_results
            .last()
            .map(|r| r.phase.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let final_observation = ObservationExtractor::new(&sm)
            .extract(1, &final_phase, 10)
            .await;

        let decision_traces: BTreeMap<String, Vec<Decision>> = sm
            .agents
            .iter()
            .filter_map(|agent| {
                agent
                    .tracer()
                    .map(|t| (agent.agent_id().to_string(), t.decisions().to_vec()))
            })
            .collect();
        let all_decisions: Vec<Decision> =
            decision_traces.values().flat_map(|d| d.iter().cloned()).collect();

        let (behavioral_score, behaviors_detected) = self
            .scorer
            .score(&all_decisions, &scenario.expected_behaviors);

        let sprint_result = build_sprint_result(&phase_results, &scenario);
        let reward = self.reward.compute(
            &sprint_result,
            &phase_results,
            DEFAULT_EXPECTED_VELOCITY,
            behavioral_score,
        );

        let total_duration_seconds = start.elapsed().as_secs_f64();
        tracing::info!(
            %episode_id,
            phases = phase_results.len(),
            reward = reward.total,
            behavioral_score,
            "episode finished"
        );

        Ok(EpisodeResult {
            episode_id,
            episode_type: scenario.episode_type,
            stage: scenario.stage,
            difficulty: scenario.difficulty,
            phase_results,
            final_observation,
            reward,
            behavioral_score,
            behaviors_detected,
            decision_traces,
            sprint_result,
            total_duration_seconds,
            terminated: true,
            truncated: false,
        })
    }

    /// Build a fresh fixture for the episode: mock database, standard
    /// five-agent team with scenario overrides applied, backlog from the
    /// scenario stories. Sprint duration 0 and one simulated day keep mock
    /// development to a single immediate iteration.
    async fn setup_sprint_manager(
        &self,
        scenario: &ScenarioConfig,
        episode_id: &str,
    ) -> Result<SprintManager> {
        let output_dir = self.workspace_root.join(episode_id);
        tokio::fs::create_dir_all(&output_dir).await?;

        let config = ExperimentConfigBuilder::new()
            .name(format!("episode-{episode_id}"))
            .sprint_duration(0)
            .num_simulated_days(1)
            .tracing(true)
            .database_url("mock://")
            .workspace(output_dir.to_string_lossy(), "per_story")
            .build();

        let mut db = SharedContextDb::new("mock://");
        db.initialize().await?;

        let agents = create_team(scenario);
        let backlog = Backlog::from_stories(
            scenario.backlog_stories.clone(),
            format!("episode-{}", scenario.episode_type),
        );

        Ok(SprintManager::new(
            agents,
            db,
            config,
            output_dir,
            Some(backlog),
        ))
    }
}

/// Standard five-agent team, with scenario overrides applied per slot.
fn create_team(scenario: &ScenarioConfig) -> Vec<SprintAgent> {
    let specs: [(&str, &str, &str, &str, &str); 5] = [
        ("dev_lead", "Dev Lead", "senior", "developer", "backend"),
        ("qa_lead", "QA Lead", "senior", "tester", "testing"),
        ("po", "Product Owner", "senior", "leader", "product"),
        ("dev_mid_backend", "Dev Mid", "mid", "developer", "backend"),
        ("dev_junior_fullstack", "Dev Junior", "junior", "developer", "fullstack"),
    ];

    specs
        .into_iter()
        .map(|(role_id, name, seniority, archetype, spec)| {
            let overrides = scenario.agent_overrides.get(role_id);
            let mut config = AgentConfig::new(role_id, name);
            config.seniority = seniority.to_string();
            config.role_archetype = archetype.to_string();
            config.primary_specialization = spec.to_string();
            if let Some(o) = overrides {
                if let Some(name) = &o.name {
                    config.name = name.clone();
                }
                if let Some(seniority) = &o.seniority {
                    config.seniority = seniority.clone();
                }
                if let Some(spec) = &o.primary_specialization {
                    config.primary_specialization = spec.clone();
                }
                if let Some(archetype) = &o.role_archetype {
                    config.role_archetype = archetype.clone();
                }
            }
            SprintAgent::new(config)
        })
        .collect()
}

/// Synthesize a sprint-result record from phase artifacts. Development
/// contributes `days_completed` and pairing sessions; QA review refines
/// completion with `cards_approved`.
fn build_sprint_result(phase_results: &[PhaseResult], scenario: &ScenarioConfig) -> SprintRecord {
    let features_planned = (scenario.backlog_stories.len() as u32).max(1);
    let mut features_completed = 0u32;
    let mut pairing_sessions = 0u32;

    for pr in phase_results {
        if pr.error.is_some() {
            continue;
        }
        match pr.phase.as_str() {
            "development" => {
                features_completed = pr
                    .artifacts
                    .get("days_completed")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as u32)
                    .unwrap_or(features_planned);
                pairing_sessions = pr
                    .artifacts
                    .get("pairing_sessions")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as u32)
                    .unwrap_or(0);
            }
            "qa_review" => {
                features_completed = pr
                    .artifacts
                    .get("cards_approved")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as u32)
                    .unwrap_or(features_completed);
            }
            _ => {}
        }
    }

    SprintRecord {
        sprint: 1,
        velocity: features_completed * 3,
        features_completed,
        features_planned,
        test_coverage: if features_completed > 0 { 0.8 } else { 0.0 },
        pairing_sessions,
        ..SprintRecord::for_sprint(1)
    }
}
