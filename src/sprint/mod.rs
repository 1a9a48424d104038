//! The episode-time sprint team fixture.
//!
//! [`SprintManager`] bundles the agents, mock database, kanban view, backlog,
//! and optional collaborators (disturbance engine, onboarding manager) behind
//! the surface the orchestration layer consumes: five phase methods, tracer
//! attachment, phase propagation, kanban snapshots, and the sprint-results
//! list. Phase behavior is synthetic but observable — planning pulls stories
//! onto the board, development simulates pair-programming days, QA review
//! approves finished cards, retro records a [`SprintRecord`], meta-learning
//! appends to the database collaborator — so full episodes run offline and
//! still produce decisions worth scoring.

pub mod agent;
pub mod backlog;
pub mod disturbance;
pub mod kanban;

pub use agent::{AgentConfig, ConversationTurn, SprintAgent, SwapState};
pub use backlog::{Backlog, Story};
pub use disturbance::{DisturbanceEngine, OnboardingManager};
pub use kanban::{Kanban, KanbanCard, KanbanSnapshot, SharedContextDb, KANBAN_COLUMNS};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use crate::config::ExperimentConfig;
use crate::error::{Error, Result};
use crate::tracer::DecisionKind;

/// Opaque per-phase artifact map.
pub type ArtifactMap = serde_json::Map<String, Value>;

/// Metrics record for one completed sprint, including retro notes and
/// team-change events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintRecord {
    pub sprint: u32,
    #[serde(default)]
    pub velocity: u32,
    #[serde(default)]
    pub features_completed: u32,
    #[serde(default)]
    pub features_planned: u32,
    #[serde(default)]
    pub test_coverage: f64,
    #[serde(default)]
    pub pairing_sessions: u32,
    #[serde(default)]
    pub departure_events: Vec<String>,
    #[serde(default)]
    pub backfill_events: Vec<String>,
    #[serde(default)]
    pub keep: Vec<String>,
    #[serde(default)]
    pub drop: Vec<String>,
    #[serde(default)]
    pub puzzle: Vec<String>,
}

impl SprintRecord {
    /// Empty record for a sprint number.
    pub fn for_sprint(sprint: u32) -> Self {
        Self {
            sprint,
            velocity: 0,
            features_completed: 0,
            features_planned: 0,
            test_coverage: 0.0,
            pairing_sessions: 0,
            departure_events: Vec::new(),
            backfill_events: Vec::new(),
            keep: Vec::new(),
            drop: Vec::new(),
            puzzle: Vec::new(),
        }
    }
}

/// One meta-learning derived from a retrospective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaLearning {
    pub sprint: u32,
    #[serde(default)]
    pub keep: Vec<String>,
    #[serde(default)]
    pub drop: Vec<String>,
    #[serde(default)]
    pub puzzle: Vec<String>,
}

/// The sprint team fixture consumed by the phase runner, action executor,
/// observation extractor, and checkpoint manager.
pub struct SprintManager {
    pub agents: Vec<SprintAgent>,
    pub db: SharedContextDb,
    pub kanban: Kanban,
    pub config: ExperimentConfig,
    pub backlog: Option<Backlog>,
    pub disturbance_engine: Option<Box<dyn DisturbanceEngine>>,
    pub onboarding_manager: Option<Box<dyn OnboardingManager>>,
    output_dir: PathBuf,
    sprint_results: Vec<SprintRecord>,
    last_pairing_sessions: u32,
}

impl SprintManager {
    pub fn new(
        agents: Vec<SprintAgent>,
        db: SharedContextDb,
        config: ExperimentConfig,
        output_dir: impl Into<PathBuf>,
        backlog: Option<Backlog>,
    ) -> Self {
        Self {
            agents,
            db,
            kanban: Kanban::new(),
            config,
            backlog,
            disturbance_engine: None,
            onboarding_manager: None,
            output_dir: output_dir.into(),
            sprint_results: Vec::new(),
            last_pairing_sessions: 0,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn sprint_results(&self) -> &[SprintRecord] {
        &self.sprint_results
    }

    pub fn sprint_results_mut(&mut self) -> &mut Vec<SprintRecord> {
        &mut self.sprint_results
    }

    pub fn push_sprint_result(&mut self, record: SprintRecord) {
        self.sprint_results.push(record);
    }

    pub fn find_agent(&self, agent_id: &str) -> Option<&SprintAgent> {
        self.agents.iter().find(|a| a.agent_id() == agent_id)
    }

    pub fn find_agent_mut(&mut self, agent_id: &str) -> Option<&mut SprintAgent> {
        self.agents.iter_mut().find(|a| a.agent_id() == agent_id)
    }

    /// Attach decision tracers to every agent for the given sprint.
    /// Idempotent within a sprint.
    pub fn attach_tracers(&mut self, sprint_num: u32) {
        for agent in &mut self.agents {
            agent.attach_tracer(sprint_num);
        }
    }

    /// Propagate the current ceremony phase to every agent's tracer.
    pub fn set_agent_phase(&mut self, phase: &str) {
        for agent in &mut self.agents {
            agent.set_phase(phase);
        }
    }

    /// Snapshot the kanban board.
    pub async fn kanban_snapshot(&self) -> KanbanSnapshot {
        self.kanban.snapshot(&self.db).await
    }

    /// Export every agent's trace to `{output_dir}/traces/`.
    pub async fn write_traces(&self) -> Result<()> {
        let trace_dir = self.output_dir.join("traces");
        for agent in &self.agents {
            if let Some(tracer) = agent.tracer() {
                tracer.write_trace(&trace_dir).await?;
            }
        }
        Ok(())
    }

    // ── Phase methods ────────────────────────────────────────────────

    fn ensure_db(&self) -> Result<()> {
        if !self.db.is_initialized() {
            return Err(Error::Internal(
                "shared context database not initialized".to_string(),
            ));
        }
        Ok(())
    }

    /// Sprint planning: select available stories up to team capacity, put
    /// cards on the board, and let each role weigh in.
    pub async fn run_planning(&mut self, sprint_num: u32) -> Result<ArtifactMap> {
        self.ensure_db()?;
        let capacity = self.agents.len() * 2;
        let picked: Vec<Story> = match self.backlog.as_ref() {
            Some(backlog) => backlog
                .unselected()
                .into_iter()
                .take(capacity)
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        for story in &picked {
            if let Some(backlog) = self.backlog.as_mut() {
                backlog.mark_selected(&story.id);
            }
            self.db
                .add_card(KanbanCard {
                    id: story.id.clone(),
                    title: story.title.clone(),
                    status: "todo".to_string(),
                    story_points: story.story_points,
                    assignee: None,
                })
                .await;
        }

        let total_points: u32 = picked.iter().map(|s| s.story_points).sum();
        let context = format!("Sprint {sprint_num} planning: {} stories", picked.len());
        for agent in &mut self.agents {
            let response = match agent.config.role_archetype.as_str() {
                "leader" => format!(
                    "Selected {} stories for sprint {sprint_num} and confirmed priorities with the team",
                    picked.len()
                ),
                "tester" => "Reviewed acceptance criteria for each story and flagged edge cases to cover".to_string(),
                _ => format!(
                    "Estimated story points for the selected stories; sizing agreed at {total_points} points"
                ),
            };
            agent.record_generate(&context, &response, DecisionKind::Generate);
        }

        tracing::debug!(sprint = sprint_num, stories = picked.len(), "planning complete");
        let mut artifacts = ArtifactMap::new();
        artifacts.insert("stories_selected".into(), json!(picked.len()));
        artifacts.insert("capacity".into(), json!(capacity));
        Ok(artifacts)
    }

    /// Development: simulate pair-programming days. Each todo card flows
    /// through in-progress to done, with the driving pair recording
    /// test-first, implementation, and commit decisions.
    pub async fn run_development(
        &mut self,
        sprint_num: u32,
        duration_override: Option<u32>,
    ) -> Result<ArtifactMap> {
        self.ensure_db()?;
        let duration_minutes =
            duration_override.unwrap_or(self.config.sprint_duration_minutes);
        let days = self.config.num_simulated_days.max(1);

        let dev_idxs: Vec<usize> = self
            .agents
            .iter()
            .enumerate()
            .filter(|(_, a)| a.config.role_archetype == "developer")
            .map(|(i, _)| i)
            .collect();
        let pairs_per_day = if dev_idxs.is_empty() {
            0
        } else {
            (dev_idxs.len() / 2).max(1) as u32
        };

        let mut cards_completed = 0u32;
        let mut pairing_sessions = 0u32;
        for _day in 1..=days {
            pairing_sessions += pairs_per_day;
            let todo: Vec<(String, String)> = self
                .db
                .cards()
                .iter()
                .filter(|c| c.status == "todo")
                .map(|c| (c.id.clone(), c.title.clone()))
                .collect();
            for (i, (card_id, title)) in todo.iter().enumerate() {
                self.db.set_card_status(card_id, "in_progress").await;
                if let Some(&dev_idx) = dev_idxs.get(i % dev_idxs.len().max(1)) {
                    let context = format!("Sprint {sprint_num} development: {title}");
                    let agent = &mut self.agents[dev_idx];
                    agent.record_generate(
                        &context,
                        &format!("Writing unit tests for {title} before touching the implementation"),
                        DecisionKind::ExecuteCodingTask,
                    );
                    agent.record_generate(
                        &context,
                        &format!("Implementing {title} to make the new tests pass"),
                        DecisionKind::ExecuteCodingTask,
                    );
                    agent.record_generate(
                        &context,
                        &format!("Committing {title}: tests green, ready for review"),
                        DecisionKind::ExecuteCodingTask,
                    );
                }
                self.db.set_card_status(card_id, "done").await;
                cards_completed += 1;
            }
        }
        self.last_pairing_sessions = pairing_sessions;

        tracing::debug!(
            sprint = sprint_num,
            days,
            cards_completed,
            "development complete"
        );
        let mut artifacts = ArtifactMap::new();
        artifacts.insert("days_completed".into(), json!(days));
        artifacts.insert("pairing_sessions".into(), json!(pairing_sessions));
        artifacts.insert("cards_completed".into(), json!(cards_completed));
        artifacts.insert("duration_minutes".into(), json!(duration_minutes));
        Ok(artifacts)
    }

    /// QA review: testers verify done cards and approve them.
    pub async fn run_qa_review(&mut self, sprint_num: u32) -> Result<ArtifactMap> {
        self.ensure_db()?;
        let done: Vec<(String, String)> = self
            .db
            .cards()
            .iter()
            .filter(|c| c.status == "done")
            .map(|c| (c.id.clone(), c.title.clone()))
            .collect();
        let tester_idxs: Vec<usize> = self
            .agents
            .iter()
            .enumerate()
            .filter(|(_, a)| a.config.role_archetype == "tester")
            .map(|(i, _)| i)
            .collect();

        for (i, (card_id, title)) in done.iter().enumerate() {
            if let Some(&idx) = tester_idxs.get(i % tester_idxs.len().max(1)) {
                let context = format!("Sprint {sprint_num} QA review: {title}");
                self.agents[idx].record_generate(
                    &context,
                    &format!("Approved {title}: acceptance criteria verified against the review checklist"),
                    DecisionKind::CheckpointDecision,
                );
            }
            self.db.set_card_status(card_id, "approved").await;
        }

        let mut artifacts = ArtifactMap::new();
        artifacts.insert("cards_reviewed".into(), json!(done.len()));
        artifacts.insert("cards_approved".into(), json!(done.len()));
        artifacts.insert("cards_rejected".into(), json!(0));
        Ok(artifacts)
    }

    /// Retrospective: roll up sprint metrics into a [`SprintRecord`] and
    /// collect keep/drop/puzzle notes.
    pub async fn run_retrospective(&mut self, sprint_num: u32) -> Result<ArtifactMap> {
        self.ensure_db()?;
        let approved: Vec<&KanbanCard> = self
            .db
            .cards()
            .iter()
            .filter(|c| c.status == "approved")
            .collect();
        let velocity: u32 = approved.iter().map(|c| c.story_points).sum();
        let features_completed = approved.len() as u32;
        let features_planned = self
            .backlog
            .as_ref()
            .map(|b| b.selected_ids().len() as u32)
            .unwrap_or(features_completed);

        let keep = vec!["pairing rotation kept both devs in context".to_string()];
        let drop = vec!["standing review queue older than one day".to_string()];
        let puzzle = vec!["flaky integration suite needs an owner".to_string()];

        let context = format!("Sprint {sprint_num} retrospective");
        for agent in &mut self.agents {
            agent.record_generate(
                &context,
                &format!(
                    "Keep: {}. Drop: {}. Puzzle: {}",
                    keep[0], drop[0], puzzle[0]
                ),
                DecisionKind::Generate,
            );
        }

        let record = SprintRecord {
            sprint: sprint_num,
            velocity,
            features_completed,
            features_planned,
            test_coverage: if features_completed > 0 { 0.8 } else { 0.0 },
            pairing_sessions: self.last_pairing_sessions,
            departure_events: Vec::new(),
            backfill_events: Vec::new(),
            keep: keep.clone(),
            drop: drop.clone(),
            puzzle: puzzle.clone(),
        };
        self.sprint_results.push(record);

        let mut artifacts = ArtifactMap::new();
        artifacts.insert("sprint".into(), json!(sprint_num));
        artifacts.insert("keep".into(), json!(keep));
        artifacts.insert("drop".into(), json!(drop));
        artifacts.insert("puzzle".into(), json!(puzzle));
        Ok(artifacts)
    }

    /// Meta-learning: persist the retro outcome to the database collaborator.
    pub async fn apply_meta_learning(
        &mut self,
        sprint_num: u32,
        retro: &SprintRecord,
    ) -> Result<ArtifactMap> {
        self.ensure_db()?;
        self.db
            .add_meta_learning(MetaLearning {
                sprint: sprint_num,
                keep: retro.keep.clone(),
                drop: retro.drop.clone(),
                puzzle: retro.puzzle.clone(),
            })
            .await;
        let mut artifacts = ArtifactMap::new();
        artifacts.insert("applied".into(), json!(true));
        Ok(artifacts)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ExperimentConfigBuilder;
    use pretty_assertions::assert_eq;

    pub(crate) fn standard_team() -> Vec<SprintAgent> {
        let mut dev_lead = AgentConfig::new("dev_lead", "Dev Lead");
        dev_lead.seniority = "senior".to_string();
        let mut qa_lead = AgentConfig::new("qa_lead", "QA Lead");
        qa_lead.seniority = "senior".to_string();
        qa_lead.role_archetype = "tester".to_string();
        qa_lead.primary_specialization = "testing".to_string();
        let mut po = AgentConfig::new("po", "Product Owner");
        po.seniority = "senior".to_string();
        po.role_archetype = "leader".to_string();
        po.primary_specialization = "product".to_string();
        let dev_mid = AgentConfig::new("dev_mid_backend", "Dev Mid");
        let mut dev_junior = AgentConfig::new("dev_junior_fullstack", "Dev Junior");
        dev_junior.seniority = "junior".to_string();
        dev_junior.primary_specialization = "fullstack".to_string();
        [dev_lead, qa_lead, po, dev_mid, dev_junior]
            .into_iter()
            .map(SprintAgent::new)
            .collect()
    }

    pub(crate) async fn fixture_with_stories(stories: Vec<Story>) -> SprintManager {
        let mut db = SharedContextDb::new("mock://");
        db.initialize().await.unwrap();
        let config = ExperimentConfigBuilder::new()
            .sprint_duration(0)
            .num_simulated_days(1)
            .tracing(true)
            .build();
        let backlog = Backlog::from_stories(stories, "episode-test");
        let mut sm = SprintManager::new(standard_team(), db, config, "/tmp/sprintgym-test", Some(backlog));
        sm.attach_tracers(1);
        sm
    }

    fn stories() -> Vec<Story> {
        vec![
            Story {
                id: "US-1".into(),
                title: "Login endpoint".into(),
                story_points: 3,
                ..Default::default()
            },
            Story {
                id: "US-2".into(),
                title: "Logout endpoint".into(),
                story_points: 2,
                ..Default::default()
            },
        ]
    }

    #[tokio::test]
    async fn planning_selects_stories_onto_the_board() {
        let mut sm = fixture_with_stories(stories()).await;
        sm.set_agent_phase("planning");
        let artifacts = sm.run_planning(1).await.unwrap();
        assert_eq!(artifacts["stories_selected"], serde_json::json!(2));
        let snapshot = sm.kanban_snapshot().await;
        assert_eq!(snapshot["todo"].len(), 2);
        assert_eq!(sm.backlog.as_ref().unwrap().selected_ids().len(), 2);
        // Every agent weighed in.
        for agent in &sm.agents {
            assert_eq!(agent.tracer().unwrap().decisions().len(), 1);
        }
    }

    #[tokio::test]
    async fn development_completes_cards_and_records_tdd_flow() {
        let mut sm = fixture_with_stories(stories()).await;
        sm.set_agent_phase("planning");
        sm.run_planning(1).await.unwrap();
        sm.set_agent_phase("development");
        let artifacts = sm.run_development(1, None).await.unwrap();
        assert_eq!(artifacts["days_completed"], serde_json::json!(1));
        assert_eq!(artifacts["cards_completed"], serde_json::json!(2));
        let snapshot = sm.kanban_snapshot().await;
        assert_eq!(snapshot["done"].len(), 2);
        // The driving dev recorded test → implement → commit in order.
        let lead = sm.find_agent("dev_lead").unwrap();
        let contents: Vec<&str> = lead
            .tracer()
            .unwrap()
            .decisions()
            .iter()
            .filter(|d| d.phase == "development")
            .map(|d| d.action_content.as_str())
            .collect();
        assert!(contents[0].contains("tests"));
        assert!(contents[1].contains("Implementing"));
        assert!(contents[2].contains("Committing"));
    }

    #[tokio::test]
    async fn qa_review_approves_done_cards() {
        let mut sm = fixture_with_stories(stories()).await;
        sm.run_planning(1).await.unwrap();
        sm.run_development(1, None).await.unwrap();
        sm.set_agent_phase("qa_review");
        let artifacts = sm.run_qa_review(1).await.unwrap();
        assert_eq!(artifacts["cards_approved"], serde_json::json!(2));
        let snapshot = sm.kanban_snapshot().await;
        assert_eq!(snapshot["approved"].len(), 2);
    }

    #[tokio::test]
    async fn retrospective_pushes_a_sprint_record() {
        let mut sm = fixture_with_stories(stories()).await;
        sm.run_planning(1).await.unwrap();
        sm.run_development(1, None).await.unwrap();
        sm.run_qa_review(1).await.unwrap();
        sm.run_retrospective(1).await.unwrap();
        let record = &sm.sprint_results()[0];
        assert_eq!(record.sprint, 1);
        assert_eq!(record.features_completed, 2);
        assert_eq!(record.velocity, 5);
        assert_eq!(record.test_coverage, 0.8);
    }

    #[tokio::test]
    async fn meta_learning_lands_in_the_database() {
        let mut sm = fixture_with_stories(stories()).await;
        let retro = SprintRecord {
            keep: vec!["short standups".into()],
            ..SprintRecord::for_sprint(1)
        };
        let artifacts = sm.apply_meta_learning(1, &retro).await.unwrap();
        assert_eq!(artifacts["applied"], serde_json::json!(true));
        assert_eq!(sm.db.meta_learnings().len(), 1);
        assert_eq!(sm.db.meta_learnings()[0].keep, vec!["short standups"]);
    }
}
