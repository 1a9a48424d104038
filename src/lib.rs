//! # sprintgym-core
//!
//! A multi-agent sprint simulator exposed as a reinforcement-learning
//! environment. A team of LLM agents is driven through the ceremonies of an
//! agile sprint (planning, development, QA review, retro, meta-learning) and
//! every run is observable, scoreable, and checkpointable.
//!
//! ## Core Components
//!
//! - **Tracer**: Per-agent, per-sprint decision logs with deterministic IDs
//! - **Scenario**: 13-episode-type catalog with seeded curriculum generation
//! - **Phase / Episode**: Phase-level execution API and the one-call harness
//! - **Taxonomy / Reward**: Behavioral scoring over traces and multi-channel
//!   reward signals
//! - **Checkpoint**: Mid-episode save/restore for curriculum replay
//! - **Runtime**: Pluggable LLM backends behind a process-wide registry
//!
//! ## Example
//!
//! ```rust,no_run
//! use sprintgym_core::rl::{EpisodeOptions, EpisodeRunner};
//!
//! # async {
//! let runner = EpisodeRunner::new();
//! let result = runner
//!     .run_episode(
//!         "implementation",
//!         EpisodeOptions {
//!             difficulty: 0.5,
//!             seed: Some(42),
//!             ..Default::default()
//!         },
//!     )
//!     .await?;
//! println!("reward: {}", result.reward.total);
//! # Ok::<(), sprintgym_core::Error>(())
//! # };
//! ```

pub mod action;
pub mod checkpoint;
pub mod config;
pub mod distributor;
pub mod episode;
pub mod error;
pub mod observation;
pub mod phase;
pub mod reward;
pub mod rl;
pub mod runtime;
pub mod scenario;
pub mod sprint;
pub mod taxonomy;
pub mod tracer;

// Re-exports for convenience
pub use action::{Action, ActionExecutor, ActionResult, ACTION_SPACE_SPEC};
pub use checkpoint::{Checkpoint, CheckpointManager};
pub use config::{ExperimentConfig, ExperimentConfigBuilder};
pub use distributor::{
    build_team_profiles, build_triage_prompt, classify_story, heuristic_distribute,
    parse_assignments, score_story_for_team, ProductMetadata, StoryClassification,
    TeamCapabilityProfile, TeamConfig,
};
pub use episode::{EpisodeOptions, EpisodeResult, EpisodeRunner};
pub use error::{Error, Result};
pub use observation::{AgentObservation, Observation, ObservationExtractor};
pub use phase::{PhaseResult, PhaseRunner, PHASES};
pub use reward::{RewardCalculator, RewardSignal, RewardWeights};
pub use runtime::{
    create_runtime, get_runtime_config, register_runtime, registered_runtime_types, AgentRuntime,
    RuntimeConfig, RuntimeResult,
};
pub use scenario::{ScenarioCatalog, ScenarioConfig, EPISODE_TYPES};
pub use sprint::{Backlog, SprintAgent, SprintManager, SprintRecord, Story};
pub use taxonomy::{BehavioralCode, BehavioralScorer, BEHAVIORAL_CODES};
pub use tracer::{Decision, DecisionKind, DecisionSummary, DecisionTracer};
