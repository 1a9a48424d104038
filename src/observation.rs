//! Structured observation extraction.
//!
//! Snapshots the mutable world state of a [`SprintManager`] into a
//! serializable [`Observation`] that RL wrappers consume as their
//! observation space. Observations are created on demand and never mutated.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::sprint::{KanbanSnapshot, SprintManager, SprintRecord};
use crate::tracer::DecisionSummary;

/// Observable state of a single agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentObservation {
    pub agent_id: String,
    pub role_id: String,
    pub seniority: String,
    pub specializations: Vec<String>,
    pub is_swapped: bool,
    pub is_onboarding: bool,
    /// Last N decision summaries; empty (not absent) when tracing is off.
    #[serde(default)]
    pub recent_decisions: Vec<DecisionSummary>,
    pub conversation_length: usize,
}

/// A departure or backfill event observed in a sprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamEvent {
    pub agent_id: String,
    pub sprint: u32,
}

/// Complete observation of world state for RL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub sprint_num: u32,
    pub phase: String,
    #[serde(default)]
    pub kanban: KanbanSnapshot,
    #[serde(default)]
    pub agents: Vec<AgentObservation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint_metrics: Option<SprintRecord>,
    #[serde(default)]
    pub disturbances_active: Vec<String>,
    #[serde(default)]
    pub meta_learnings_count: usize,
    #[serde(default)]
    pub departure_events: Vec<TeamEvent>,
    #[serde(default)]
    pub backfill_events: Vec<TeamEvent>,
    /// Histogram over seniorities and `role_<archetype>` keys.
    #[serde(default)]
    pub team_composition: BTreeMap<String, u32>,
}

impl Observation {
    /// JSON representation. Serialization of an observation cannot fail;
    /// every field is plain data.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Extracts structured observations from fixture state.
pub struct ObservationExtractor<'a> {
    sm: &'a SprintManager,
}

impl<'a> ObservationExtractor<'a> {
    pub fn new(sm: &'a SprintManager) -> Self {
        Self { sm }
    }

    /// Extract a full observation of the current world state.
    ///
    /// `max_recent_decisions` bounds the per-agent decision summaries.
    pub async fn extract(
        &self,
        sprint_num: u32,
        phase: &str,
        max_recent_decisions: usize,
    ) -> Observation {
        let kanban = self.sm.kanban_snapshot().await;

        let mut agents = Vec::with_capacity(self.sm.agents.len());
        for agent in &self.sm.agents {
            let recent_decisions = agent
                .tracer()
                .map(|tracer| {
                    let decisions = tracer.decisions();
                    let skip = decisions.len().saturating_sub(max_recent_decisions);
                    decisions
                        .iter()
                        .skip(skip)
                        .map(|d| d.summary(agent.agent_id()))
                        .collect()
                })
                .unwrap_or_default();

            let is_onboarding = self
                .sm
                .onboarding_manager
                .as_ref()
                .map(|mgr| mgr.is_onboarding(agent.agent_id()))
                .unwrap_or(false);

            agents.push(AgentObservation {
                agent_id: agent.agent_id().to_string(),
                role_id: agent.config.role_id.clone(),
                seniority: agent.config.seniority.clone(),
                specializations: agent.config.specializations(),
                is_swapped: agent.is_swapped,
                is_onboarding,
                recent_decisions,
                conversation_length: agent.conversation_history.len(),
            });
        }

        let sprint_metrics = self
            .sm
            .sprint_results()
            .iter()
            .find(|r| r.sprint == sprint_num)
            .cloned();

        let disturbances_active = self
            .sm
            .disturbance_engine
            .as_ref()
            .map(|engine| engine.active())
            .unwrap_or_default();

        let meta_learnings_count = self.meta_learnings_count().await;

        let (departure_events, backfill_events) = match &sprint_metrics {
            Some(metrics) => (
                metrics
                    .departure_events
                    .iter()
                    .map(|id| TeamEvent {
                        agent_id: id.clone(),
                        sprint: sprint_num,
                    })
                    .collect(),
                metrics
                    .backfill_events
                    .iter()
                    .map(|id| TeamEvent {
                        agent_id: id.clone(),
                        sprint: sprint_num,
                    })
                    .collect(),
            ),
            None => (Vec::new(), Vec::new()),
        };

        let mut team_composition: BTreeMap<String, u32> = BTreeMap::new();
        for agent in &self.sm.agents {
            *team_composition
                .entry(agent.config.seniority.clone())
                .or_default() += 1;
        }
        for agent in &self.sm.agents {
            *team_composition
                .entry(format!("role_{}", agent.config.role_archetype))
                .or_default() += 1;
        }

        Observation {
            sprint_num,
            phase: phase.to_string(),
            kanban,
            agents,
            sprint_metrics,
            disturbances_active,
            meta_learnings_count,
            departure_events,
            backfill_events,
            team_composition,
        }
    }

    /// Best-effort line count of the meta-learnings JSONL file, if the team
    /// config directory is set and the file exists. Any failure reads as 0.
    async fn meta_learnings_count(&self) -> usize {
        let Some(dir) = &self.sm.config.team_config_dir else {
            return 0;
        };
        let path = dir.join("07_meta").join("meta_learnings.jsonl");
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => content.lines().filter(|l| !l.trim().is_empty()).count(),
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sprint::tests::fixture_with_stories;
    use crate::sprint::{OnboardingManager, Story};
    use pretty_assertions::assert_eq;

    struct FixedOnboarding(&'static str);

    impl OnboardingManager for FixedOnboarding {
        fn is_onboarding(&self, agent_id: &str) -> bool {
            agent_id == self.0
        }
    }

    fn stories() -> Vec<Story> {
        vec![Story {
            id: "US-1".into(),
            title: "Login endpoint".into(),
            story_points: 3,
            ..Default::default()
        }]
    }

    #[tokio::test]
    async fn observation_captures_team_and_board() {
        let mut sm = fixture_with_stories(stories()).await;
        sm.set_agent_phase("planning");
        sm.run_planning(1).await.unwrap();

        let extractor = ObservationExtractor::new(&sm);
        let obs = extractor.extract(1, "planning", 10).await;
        assert_eq!(obs.sprint_num, 1);
        assert_eq!(obs.phase, "planning");
        assert_eq!(obs.agents.len(), 5);
        assert_eq!(obs.kanban["todo"].len(), 1);
        assert_eq!(obs.team_composition["senior"], 3);
        assert_eq!(obs.team_composition["role_developer"], 3);
        assert_eq!(obs.team_composition["role_tester"], 1);
        // Every agent recorded one planning decision.
        assert!(obs.agents.iter().all(|a| a.recent_decisions.len() == 1));
    }

    #[tokio::test]
    async fn recent_decisions_are_bounded() {
        let mut sm = fixture_with_stories(stories()).await;
        sm.set_agent_phase("development");
        {
            let agent = sm.find_agent_mut("dev_lead").unwrap();
            for i in 0..15 {
                agent.record_generate(
                    "ctx",
                    &format!("step {i}"),
                    crate::tracer::DecisionKind::Generate,
                );
            }
        }
        let extractor = ObservationExtractor::new(&sm);
        let obs = extractor.extract(1, "development", 10).await;
        let lead = obs.agents.iter().find(|a| a.agent_id == "dev_lead").unwrap();
        assert_eq!(lead.recent_decisions.len(), 10);
        // The newest decisions are kept.
        assert!(lead.recent_decisions[9].decision_id.ends_with("015"));
    }

    #[tokio::test]
    async fn sprint_metrics_match_by_number() {
        let mut sm = fixture_with_stories(stories()).await;
        sm.run_planning(1).await.unwrap();
        sm.run_development(1, None).await.unwrap();
        sm.run_qa_review(1).await.unwrap();
        sm.run_retrospective(1).await.unwrap();

        let extractor = ObservationExtractor::new(&sm);
        let obs = extractor.extract(1, "retro", 10).await;
        assert_eq!(obs.sprint_metrics.as_ref().unwrap().sprint, 1);

        let other = extractor.extract(2, "retro", 10).await;
        assert!(other.sprint_metrics.is_none());
    }

    #[tokio::test]
    async fn onboarding_flag_comes_from_the_manager() {
        let mut sm = fixture_with_stories(stories()).await;
        sm.onboarding_manager = Some(Box::new(FixedOnboarding("dev_junior_fullstack")));
        let extractor = ObservationExtractor::new(&sm);
        let obs = extractor.extract(1, "planning", 10).await;
        let junior = obs
            .agents
            .iter()
            .find(|a| a.agent_id == "dev_junior_fullstack")
            .unwrap();
        assert!(junior.is_onboarding);
        assert!(obs.agents.iter().filter(|a| a.is_onboarding).count() == 1);
    }

    #[tokio::test]
    async fn meta_learnings_count_reads_jsonl_best_effort() {
        let dir = tempfile::tempdir().unwrap();
        let meta_dir = dir.path().join("07_meta");
        std::fs::create_dir_all(&meta_dir).unwrap();
        std::fs::write(
            meta_dir.join("meta_learnings.jsonl"),
            "{\"sprint\":1}\n{\"sprint\":2}\n",
        )
        .unwrap();

        let mut sm = fixture_with_stories(stories()).await;
        sm.config.team_config_dir = Some(dir.path().to_path_buf());
        let extractor = ObservationExtractor::new(&sm);
        let obs = extractor.extract(1, "planning", 10).await;
        assert_eq!(obs.meta_learnings_count, 2);
    }

    #[tokio::test]
    async fn observation_serializes_to_json() {
        let mut sm = fixture_with_stories(stories()).await;
        sm.run_planning(1).await.unwrap();
        let extractor = ObservationExtractor::new(&sm);
        let obs = extractor.extract(1, "planning", 10).await;
        let value = obs.to_value();
        assert!(value.is_object());
        // Round-trips through a JSON string.
        let text = serde_json::to_string(&value).unwrap();
        let back: Observation = serde_json::from_str(&text).unwrap();
        assert_eq!(back, obs);
    }
}
