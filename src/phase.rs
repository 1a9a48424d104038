//! Phase-level execution API.
//!
//! [`PhaseRunner`] runs individual sprint ceremonies in isolation for
//! episode-level training, wrapping the fixture's phase methods with tracer
//! setup, timing, error capture, decision harvesting, and a kanban snapshot.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::sprint::{ArtifactMap, KanbanSnapshot, SprintManager, SprintRecord};
use crate::tracer::DecisionSummary;

/// The five sprint ceremonies, in canonical order.
pub const PHASES: [&str; 5] = [
    "planning",
    "development",
    "qa_review",
    "retro",
    "meta_learning",
];

/// Result of a single phase execution.
///
/// Phase-method failures land in `error`; the result itself is always
/// produced, including the kanban snapshot taken after the failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: String,
    pub sprint_num: u32,
    pub duration_seconds: f64,
    /// Summaries of decisions recorded during this phase, across agents.
    #[serde(default)]
    pub decisions: Vec<DecisionSummary>,
    /// Phase-specific artifact map, opaque to the runner.
    #[serde(default)]
    pub artifacts: ArtifactMap,
    #[serde(default)]
    pub kanban_snapshot: KanbanSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs individual sprint phases against a fixture.
pub struct PhaseRunner<'a> {
    sm: &'a mut SprintManager,
}

impl<'a> PhaseRunner<'a> {
    pub fn new(sm: &'a mut SprintManager) -> Self {
        Self { sm }
    }

    /// Run a single phase and return structured results.
    ///
    /// `duration_minutes` overrides wall-clock duration and only applies to
    /// development. Unknown phase names are a validation error listing the
    /// valid names; phase-method failures are captured in the result.
    pub async fn run_phase(
        &mut self,
        phase: &str,
        sprint_num: u32,
        duration_minutes: Option<u32>,
    ) -> Result<PhaseResult> {
        if !PHASES.contains(&phase) {
            return Err(Error::unknown_option("phase", phase, &PHASES));
        }

        let tracing_enabled = self.sm.config.tracing_enabled;
        if tracing_enabled {
            self.sm.attach_tracers(sprint_num);
        }
        self.sm.set_agent_phase(phase);

        let start = Instant::now();
        let (artifacts, error) = match self.dispatch(phase, sprint_num, duration_minutes).await {
            Ok(artifacts) => (artifacts, None),
            Err(e) => {
                tracing::warn!(phase, sprint = sprint_num, error = %e, "phase failed");
                (ArtifactMap::new(), Some(e.to_string()))
            }
        };
        let duration_seconds = start.elapsed().as_secs_f64();

        let mut decisions = Vec::new();
        if tracing_enabled {
            for agent in &self.sm.agents {
                if let Some(tracer) = agent.tracer() {
                    decisions.extend(
                        tracer
                            .decisions()
                            .iter()
                            .filter(|d| d.phase == phase)
                            .map(|d| d.summary(agent.agent_id())),
                    );
                }
            }
        }

        let kanban_snapshot = self.sm.kanban_snapshot().await;

        Ok(PhaseResult {
            phase: phase.to_string(),
            sprint_num,
            duration_seconds,
            decisions,
            artifacts,
            kanban_snapshot,
            error,
        })
    }

    /// Run phases in order, stopping after the first phase whose `error`
    /// field is set. The returned list is a prefix of the input.
    pub async fn run_sequence(
        &mut self,
        phases: &[String],
        sprint_num: u32,
    ) -> Result<Vec<PhaseResult>> {
        let mut results = Vec::with_capacity(phases.len());
        for phase in phases {
            let result = self.run_phase(phase, sprint_num, None).await?;
            let failed = result.error.is_some();
            results.push(result);
            if failed {
                break;
            }
        }
        Ok(results)
    }

    async fn dispatch(
        &mut self,
        phase: &str,
        sprint_num: u32,
        duration_minutes: Option<u32>,
    ) -> Result<ArtifactMap> {
        match phase {
            "planning" => self.sm.run_planning(sprint_num).await,
            "development" => self.sm.run_development(sprint_num, duration_minutes).await,
            "qa_review" => self.sm.run_qa_review(sprint_num).await,
            "retro" => self.sm.run_retrospective(sprint_num).await,
            "meta_learning" => {
                let retro = self
                    .sm
                    .sprint_results()
                    .last()
                    .cloned()
                    .unwrap_or_else(|| SprintRecord::for_sprint(sprint_num));
                self.sm.apply_meta_learning(sprint_num, &retro).await
            }
            _ => Ok(ArtifactMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExperimentConfigBuilder;
    use crate::sprint::tests::{fixture_with_stories, standard_team};
    use crate::sprint::{Backlog, SharedContextDb, Story};
    use pretty_assertions::assert_eq;

    fn stories() -> Vec<Story> {
        vec![Story {
            id: "US-1".into(),
            title: "Login endpoint".into(),
            story_points: 3,
            ..Default::default()
        }]
    }

    #[tokio::test]
    async fn unknown_phase_is_a_validation_error() {
        let mut sm = fixture_with_stories(stories()).await;
        let mut runner = PhaseRunner::new(&mut sm);
        let err = runner.run_phase("compile", 1, None).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("compile"));
        assert!(msg.contains("meta_learning"));
    }

    #[tokio::test]
    async fn run_phase_harvests_only_matching_decisions() {
        let mut sm = fixture_with_stories(stories()).await;
        let mut runner = PhaseRunner::new(&mut sm);
        let planning = runner.run_phase("planning", 1, None).await.unwrap();
        assert!(planning.error.is_none());
        assert_eq!(planning.decisions.len(), 5);
        assert!(planning.decisions.iter().all(|d| d.phase == "planning"));

        let development = runner.run_phase("development", 1, None).await.unwrap();
        assert!(development.decisions.iter().all(|d| d.phase == "development"));
        assert_eq!(development.artifacts["days_completed"], serde_json::json!(1));
        assert_eq!(development.kanban_snapshot["done"].len(), 1);
    }

    #[tokio::test]
    async fn decisions_are_empty_when_tracing_is_off() {
        let mut db = SharedContextDb::new("mock://");
        db.initialize().await.unwrap();
        let config = ExperimentConfigBuilder::new()
            .num_simulated_days(1)
            .tracing(false)
            .build();
        let backlog = Backlog::from_stories(stories(), "untraced");
        let mut sm = crate::sprint::SprintManager::new(
            standard_team(),
            db,
            config,
            "/tmp/sprintgym-test",
            Some(backlog),
        );
        let mut runner = PhaseRunner::new(&mut sm);
        let result = runner.run_phase("planning", 1, None).await.unwrap();
        assert!(result.error.is_none());
        assert!(result.decisions.is_empty());
    }

    #[tokio::test]
    async fn run_sequence_stops_at_first_error() {
        // An uninitialized database makes every phase method fail.
        let config = ExperimentConfigBuilder::new().tracing(true).build();
        let db = SharedContextDb::new("mock://");
        let mut sm = crate::sprint::SprintManager::new(
            standard_team(),
            db,
            config,
            "/tmp/sprintgym-test",
            Some(Backlog::from_stories(stories(), "failing")),
        );
        let mut runner = PhaseRunner::new(&mut sm);
        let phases: Vec<String> = ["planning", "development", "qa_review"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let results = runner.run_sequence(&phases, 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].phase, "planning");
        assert!(results[0].error.as_ref().unwrap().contains("not initialized"));
    }

    #[tokio::test]
    async fn run_sequence_covers_all_phases_when_healthy() {
        let mut sm = fixture_with_stories(stories()).await;
        let mut runner = PhaseRunner::new(&mut sm);
        let phases: Vec<String> = PHASES.iter().map(|s| s.to_string()).collect();
        let results = runner.run_sequence(&phases, 1).await.unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.error.is_none()));
        // Retro pushed a record that meta-learning then consumed.
        assert_eq!(sm.sprint_results().len(), 1);
        assert_eq!(sm.db.meta_learnings().len(), 1);
    }

    #[tokio::test]
    async fn meta_learning_without_retro_uses_synthetic_empty_record() {
        let mut sm = fixture_with_stories(stories()).await;
        let mut runner = PhaseRunner::new(&mut sm);
        let result = runner.run_phase("meta_learning", 1, None).await.unwrap();
        assert!(result.error.is_none());
        assert_eq!(result.artifacts["applied"], serde_json::json!(true));
        assert_eq!(sm.db.meta_learnings().len(), 1);
        assert!(sm.db.meta_learnings()[0].keep.is_empty());
    }
}
