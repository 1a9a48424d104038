//! Stable RL integration surface.
//!
//! Gym-style wrappers should import from here and nowhere else:
//!
//! ```
//! use sprintgym_core::rl::{EpisodeRunner, ScenarioCatalog, RewardCalculator};
//! use sprintgym_core::rl::{Action, ActionExecutor, CheckpointManager, BehavioralScorer};
//! ```
//!
//! Everything re-exported below is the stable contract; the rest of the
//! crate may change shape between versions.

// Episode harness
pub use crate::episode::{EpisodeOptions, EpisodeResult, EpisodeRunner};

// Scenario catalog
pub use crate::scenario::{ScenarioCatalog, ScenarioConfig, EPISODE_TYPES};

// Observation
pub use crate::observation::{AgentObservation, Observation, ObservationExtractor};

// Reward
pub use crate::reward::{RewardCalculator, RewardSignal, RewardWeights};

// Behavioral taxonomy
pub use crate::taxonomy::{BehavioralCode, BehavioralScorer, BEHAVIORAL_CODES};

// Action space
pub use crate::action::{
    Action, ActionExecutor, ActionResult, BackfillConfig, BacklogOp, TeamOp, ACTION_SPACE_SPEC,
};

// Checkpointing
pub use crate::checkpoint::{Checkpoint, CheckpointManager};

// Config
pub use crate::config::{ExperimentConfig, ExperimentConfigBuilder};

// Phase runner
pub use crate::phase::{PhaseResult, PhaseRunner};

// Runtime registry
pub use crate::runtime::register_runtime;
