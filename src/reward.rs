//! Multi-channel reward signals for RL training.
//!
//! Computes outcome, behavioral, efficiency, and phase-completion channels
//! from sprint data. The behavioral channel is supplied externally — either
//! from [`BehavioralScorer`](crate::taxonomy::BehavioralScorer) or from a
//! trainer's own judge.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::phase::PhaseResult;
use crate::sprint::SprintRecord;

/// Target velocity used for the outcome ratio when callers have no better
/// estimate.
pub const DEFAULT_EXPECTED_VELOCITY: u32 = 10;

/// Configurable channel weights. Defaults: outcome 0.40, behavioral 0.30,
/// efficiency 0.15, phase completion 0.15.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardWeights {
    pub outcome: f64,
    pub behavioral: f64,
    pub efficiency: f64,
    pub phase_completion: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            outcome: 0.40,
            behavioral: 0.30,
            efficiency: 0.15,
            phase_completion: 0.15,
        }
    }
}

/// Multi-channel reward signal. Every channel and the total lie in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardSignal {
    pub outcome: f64,
    pub efficiency: f64,
    pub phase_completion: f64,
    pub behavioral: f64,
    pub total: f64,
    /// Intermediate ratios for debugging/introspection.
    #[serde(default)]
    pub components: BTreeMap<String, f64>,
}

/// Computes reward signals from sprint and phase data.
///
/// Outcome blends velocity ratio, test coverage, and completion rate;
/// efficiency penalizes excess pairing sessions; phase completion is the
/// fraction of phases that finished without error.
#[derive(Debug, Clone, Default)]
pub struct RewardCalculator {
    weights: RewardWeights,
}

impl RewardCalculator {
    pub fn new(weights: RewardWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &RewardWeights {
        &self.weights
    }

    /// Compute reward from a full sprint result.
    ///
    /// `phase_results` may be empty, in which case the phase-completion
    /// channel is 1.0. `behavioral_score` is taken as-is (clamped to [0, 1]).
    pub fn compute(
        &self,
        sprint_result: &SprintRecord,
        phase_results: &[PhaseResult],
        expected_velocity: u32,
        behavioral_score: f64,
    ) -> RewardSignal {
        let features = sprint_result.features_completed as f64;
        let features_planned = sprint_result.features_planned.max(1) as f64;

        let velocity_ratio =
            (sprint_result.velocity as f64 / expected_velocity.max(1) as f64).min(1.0);
        let completion_rate = (features / features_planned).min(1.0);
        let coverage_score = sprint_result.test_coverage.clamp(0.0, 1.0);

        let outcome = 0.4 * velocity_ratio + 0.3 * coverage_score + 0.3 * completion_rate;

        // Heuristic cap: three pairing sessions per planned feature.
        let max_sessions = (sprint_result.features_planned * 3).max(1) as f64;
        let sessions_ratio = sprint_result.pairing_sessions as f64 / max_sessions;
        let efficiency = (1.0 - sessions_ratio * 0.5).clamp(0.0, 1.0);

        let phase_completion = Self::phase_completion(phase_results);
        let behavioral = behavioral_score.clamp(0.0, 1.0);

        let w = &self.weights;
        let total = w.outcome * outcome
            + w.behavioral * behavioral
            + w.efficiency * efficiency
            + w.phase_completion * phase_completion;

        let mut components = BTreeMap::new();
        components.insert("velocity_ratio".into(), round4(velocity_ratio));
        components.insert("coverage_score".into(), round4(coverage_score));
        components.insert("completion_rate".into(), round4(completion_rate));
        components.insert("sessions_ratio".into(), round4(sessions_ratio));

        RewardSignal {
            outcome: round4(outcome),
            efficiency: round4(efficiency),
            phase_completion: round4(phase_completion),
            behavioral: round4(behavioral),
            total: round4(total),
            components,
        }
    }

    /// Compute reward for a single phase (episode-level training).
    ///
    /// Completion is binary (no error); outcome saturates on artifact count;
    /// efficiency decays linearly over a ten-minute window.
    pub fn compute_phase_reward(
        &self,
        phase_result: &PhaseResult,
        behavioral_score: f64,
    ) -> RewardSignal {
        let completed = if phase_result.error.is_none() { 1.0 } else { 0.0 };

        let artifact_count = phase_result.artifacts.len() as f64;
        let outcome = if completed > 0.0 {
            artifact_count.min(1.0)
        } else {
            0.0
        };

        let max_duration = 600.0;
        let efficiency = if completed > 0.0 {
            (1.0 - phase_result.duration_seconds / max_duration).max(0.0)
        } else {
            0.0
        };

        let behavioral = behavioral_score.clamp(0.0, 1.0);
        let w = &self.weights;
        let total = w.outcome * outcome
            + w.behavioral * behavioral
            + w.efficiency * efficiency
            + w.phase_completion * completed;

        let mut components = BTreeMap::new();
        components.insert("artifact_count".into(), artifact_count);
        components.insert(
            "duration_seconds".into(),
            (phase_result.duration_seconds * 100.0).round() / 100.0,
        );
        components.insert("completed".into(), completed);

        RewardSignal {
            outcome: round4(outcome),
            efficiency: round4(efficiency),
            phase_completion: round4(completed),
            behavioral: round4(behavioral),
            total: round4(total),
            components,
        }
    }

    /// Fraction of phases that completed without error; 1.0 with no data.
    fn phase_completion(phase_results: &[PhaseResult]) -> f64 {
        if phase_results.is_empty() {
            return 1.0;
        }
        let completed = phase_results.iter().filter(|p| p.error.is_none()).count();
        completed as f64 / phase_results.len() as f64
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}
