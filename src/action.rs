//! The RL action space: five tagged variants plus their executor.
//!
//! Actions mutate the episode fixture between phases. The space is a closed
//! sum — gym-style consumers read [`ACTION_SPACE_SPEC`] at startup to build
//! their action encodings. Execution never raises: every action yields an
//! [`ActionResult`] with `success` and an optional `reason`, and batches run
//! to completion regardless of individual failures.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::LazyLock;

use crate::sprint::{AgentConfig, SprintAgent, SprintManager, Story};

fn default_severity() -> f64 {
    0.5
}

fn default_proficiency() -> f64 {
    0.7
}

/// Backfill agent settings; absent fields fall back to fixture defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackfillConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seniority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_specialization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_archetype: Option<String>,
}

/// Backlog operation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacklogOp {
    Add,
    Remove,
}

/// Team composition operation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamOp {
    Depart,
    Backfill,
}

/// An RL action applied to the episode fixture between phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Inject a disturbance event into the sprint.
    InjectDisturbance {
        disturbance_type: String,
        #[serde(default = "default_severity")]
        severity: f64,
    },
    /// Swap an agent to a different role profile.
    SwapAgentRole {
        agent_id: String,
        target_role_id: String,
        #[serde(default = "default_proficiency")]
        proficiency: f64,
    },
    /// Add or remove a story from the backlog.
    ModifyBacklog {
        op: BacklogOp,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        story: Option<Story>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        story_id: Option<String>,
    },
    /// Remove an agent from the team or backfill a new one.
    ModifyTeamComposition {
        op: TeamOp,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        backfill_config: Option<BackfillConfig>,
    },
    /// Adjust sprint duration and/or WIP limits in place.
    AdjustSprintParams {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_minutes: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wip_limits: Option<std::collections::BTreeMap<String, u32>>,
    },
}

impl Action {
    /// Wire name of the variant, matching [`ACTION_SPACE_SPEC`] keys.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InjectDisturbance { .. } => "inject_disturbance",
            Self::SwapAgentRole { .. } => "swap_agent_role",
            Self::ModifyBacklog { .. } => "modify_backlog",
            Self::ModifyTeamComposition { .. } => "modify_team_composition",
            Self::AdjustSprintParams { .. } => "adjust_sprint_params",
        }
    }
}

/// Structured metadata for gym-style action space construction.
pub static ACTION_SPACE_SPEC: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "inject_disturbance": {
            "params": {
                "disturbance_type": {
                    "type": "categorical",
                    "values": [
                        "flaky_test",
                        "production_incident",
                        "scope_creep",
                        "merge_conflict",
                        "test_failures",
                        "technical_debt",
                        "dependency_break",
                    ],
                },
                "severity": {"type": "continuous", "low": 0.0, "high": 1.0},
            },
        },
        "swap_agent_role": {
            "params": {
                "agent_id": {"type": "agent_ref"},
                "target_role_id": {"type": "role_ref"},
                "proficiency": {"type": "continuous", "low": 0.1, "high": 1.0},
            },
        },
        "modify_backlog": {
            "params": {
                "op": {"type": "categorical", "values": ["add", "remove"]},
                "story": {"type": "dict"},
                "story_id": {"type": "string"},
            },
        },
        "modify_team_composition": {
            "params": {
                "op": {"type": "categorical", "values": ["depart", "backfill"]},
                "agent_id": {"type": "agent_ref"},
                "backfill_config": {"type": "dict"},
            },
        },
        "adjust_sprint_params": {
            "params": {
                "duration_minutes": {"type": "discrete", "low": 1, "high": 120},
                "wip_limits": {"type": "dict"},
            },
        },
    })
});

/// Outcome of one executed action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub action: &'static str,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl ActionResult {
    fn ok(action: &'static str) -> Self {
        Self {
            action,
            success: true,
            reason: None,
            details: Map::new(),
        }
    }

    fn fail(action: &'static str, reason: impl Into<String>) -> Self {
        Self {
            action,
            success: false,
            reason: Some(reason.into()),
            details: Map::new(),
        }
    }

    fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }
}

/// Executes RL actions against the sprint fixture.
pub struct ActionExecutor<'a> {
    sm: &'a mut SprintManager,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(sm: &'a mut SprintManager) -> Self {
        Self { sm }
    }

    /// Execute a single action. Failures (missing collaborator, unknown
    /// agent, engine errors) come back as `success == false`.
    pub async fn execute(&mut self, action: &Action) -> ActionResult {
        match action {
            Action::InjectDisturbance {
                disturbance_type,
                severity,
            } => self.inject_disturbance(disturbance_type, *severity).await,
            Action::SwapAgentRole {
                agent_id,
                target_role_id,
                proficiency,
            } => self.swap_agent_role(agent_id, target_role_id, *proficiency),
            Action::ModifyBacklog {
                op,
                story,
                story_id,
            } => self.modify_backlog(*op, story.as_ref(), story_id.as_deref()),
            Action::ModifyTeamComposition {
                op,
                agent_id,
                backfill_config,
            } => self.modify_team_composition(*op, agent_id.as_deref(), backfill_config.as_ref()),
            Action::AdjustSprintParams {
                duration_minutes,
                wip_limits,
            } => self.adjust_sprint_params(*duration_minutes, wip_limits.as_ref()),
        }
    }

    /// Execute actions in order, collecting one result per action. A failed
    /// action does not abort the batch.
    pub async fn execute_batch(&mut self, actions: &[Action]) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(actions.len());
        for action in actions {
            results.push(self.execute(action).await);
        }
        results
    }

    async fn inject_disturbance(&mut self, disturbance_type: &str, severity: f64) -> ActionResult {
        let sm = &mut *self.sm;
        let Some(engine) = sm.disturbance_engine.as_mut() else {
            return ActionResult::fail("inject_disturbance", "disturbance engine not configured");
        };
        match engine
            .apply(disturbance_type, &mut sm.agents, &mut sm.kanban, &mut sm.db)
            .await
        {
            Ok(details) => ActionResult::ok("inject_disturbance")
                .with_detail("disturbance_type", json!(disturbance_type))
                .with_detail("severity", json!(severity))
                .with_detail("details", details),
            Err(e) => ActionResult::fail("inject_disturbance", e.to_string()),
        }
    }

    fn swap_agent_role(
        &mut self,
        agent_id: &str,
        target_role_id: &str,
        proficiency: f64,
    ) -> ActionResult {
        let Some(agent) = self.sm.find_agent_mut(agent_id) else {
            return ActionResult::fail("swap_agent_role", format!("agent {agent_id:?} not found"));
        };
        agent.swap_to(target_role_id, target_role_id, proficiency, 0);
        ActionResult::ok("swap_agent_role")
            .with_detail("agent_id", json!(agent_id))
            .with_detail("target_role_id", json!(target_role_id))
    }

    fn modify_backlog(
        &mut self,
        op: BacklogOp,
        story: Option<&Story>,
        story_id: Option<&str>,
    ) -> ActionResult {
        let Some(backlog) = self.sm.backlog.as_mut() else {
            return ActionResult::fail("modify_backlog", "no backlog configured");
        };
        match op {
            BacklogOp::Add => {
                let Some(story) = story else {
                    return ActionResult::fail("modify_backlog", "no story provided for add");
                };
                backlog.add_story(story.clone());
                ActionResult::ok("modify_backlog")
                    .with_detail("operation", json!("add"))
                    .with_detail("story_id", json!(story.id))
            }
            BacklogOp::Remove => {
                let Some(story_id) = story_id else {
                    return ActionResult::fail("modify_backlog", "no story_id provided for remove");
                };
                backlog.mark_returned(story_id);
                ActionResult::ok("modify_backlog")
                    .with_detail("operation", json!("remove"))
                    .with_detail("story_id", json!(story_id))
            }
        }
    }

    fn modify_team_composition(
        &mut self,
        op: TeamOp,
        agent_id: Option<&str>,
        backfill_config: Option<&BackfillConfig>,
    ) -> ActionResult {
        match op {
            TeamOp::Depart => {
                let Some(agent_id) = agent_id else {
                    return ActionResult::fail(
                        "modify_team_composition",
                        "no agent_id provided for depart",
                    );
                };
                if self.sm.find_agent(agent_id).is_none() {
                    return ActionResult::fail(
                        "modify_team_composition",
                        format!("agent {agent_id:?} not found"),
                    );
                }
                self.sm.agents.retain(|a| a.agent_id() != agent_id);
                ActionResult::ok("modify_team_composition")
                    .with_detail("operation", json!("depart"))
                    .with_detail("agent_id", json!(agent_id))
            }
            TeamOp::Backfill => {
                let empty = BackfillConfig::default();
                let cfg = backfill_config.unwrap_or(&empty);
                let mut agent_config = AgentConfig::new(
                    cfg.role_id.clone().unwrap_or_else(|| "backfill_agent".to_string()),
                    cfg.name.clone().unwrap_or_else(|| "Backfill Agent".to_string()),
                );
                if let Some(model) = &cfg.model {
                    agent_config.model = model.clone();
                }
                if let Some(seniority) = &cfg.seniority {
                    agent_config.seniority = seniority.clone();
                }
                if let Some(spec) = &cfg.primary_specialization {
                    agent_config.primary_specialization = spec.clone();
                }
                if let Some(archetype) = &cfg.role_archetype {
                    agent_config.role_archetype = archetype.clone();
                }
                let agent_id = agent_config.role_id.clone();
                self.sm.agents.push(SprintAgent::new(agent_config));
                ActionResult::ok("modify_team_composition")
                    .with_detail("operation", json!("backfill"))
                    .with_detail("agent_id", json!(agent_id))
            }
        }
    }

    fn adjust_sprint_params(
        &mut self,
        duration_minutes: Option<u32>,
        wip_limits: Option<&std::collections::BTreeMap<String, u32>>,
    ) -> ActionResult {
        let mut changes = Map::new();
        if let Some(minutes) = duration_minutes {
            self.sm.config.sprint_duration_minutes = minutes;
            changes.insert("duration_minutes".into(), json!(minutes));
        }
        if let Some(limits) = wip_limits {
            for (column, limit) in limits {
                self.sm.kanban.wip_limits.insert(column.clone(), *limit);
            }
            changes.insert("wip_limits".into(), json!(limits));
        }
        ActionResult::ok("adjust_sprint_params").with_detail("changes", Value::Object(changes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::sprint::tests::fixture_with_stories;
    use crate::sprint::{DisturbanceEngine, Kanban, SharedContextDb};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct RecordingEngine {
        fired: Vec<String>,
    }

    #[async_trait]
    impl DisturbanceEngine for RecordingEngine {
        async fn apply(
            &mut self,
            disturbance_type: &str,
            _agents: &mut [SprintAgent],
            _kanban: &mut Kanban,
            _db: &mut SharedContextDb,
        ) -> Result<Value> {
            self.fired.push(disturbance_type.to_string());
            Ok(json!({"fired": disturbance_type}))
        }

        fn active(&self) -> Vec<String> {
            self.fired.clone()
        }
    }

    fn stories() -> Vec<Story> {
        vec![Story::new("US-1", "Login endpoint")]
    }

    #[tokio::test]
    async fn inject_without_engine_fails_softly() {
        let mut sm = fixture_with_stories(stories()).await;
        let mut executor = ActionExecutor::new(&mut sm);
        let result = executor
            .execute(&Action::InjectDisturbance {
                disturbance_type: "flaky_test".into(),
                severity: 0.8,
            })
            .await;
        assert!(!result.success);
        assert!(result.reason.as_ref().unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn inject_routes_to_the_engine() {
        let mut sm = fixture_with_stories(stories()).await;
        sm.disturbance_engine = Some(Box::new(RecordingEngine { fired: Vec::new() }));
        let mut executor = ActionExecutor::new(&mut sm);
        let result = executor
            .execute(&Action::InjectDisturbance {
                disturbance_type: "flaky_test".into(),
                severity: 0.8,
            })
            .await;
        assert!(result.success);
        assert_eq!(result.details["details"]["fired"], "flaky_test");
        assert_eq!(
            sm.disturbance_engine.as_ref().unwrap().active(),
            vec!["flaky_test".to_string()]
        );
    }

    #[tokio::test]
    async fn swap_marks_the_agent() {
        let mut sm = fixture_with_stories(stories()).await;
        let mut executor = ActionExecutor::new(&mut sm);
        let result = executor
            .execute(&Action::SwapAgentRole {
                agent_id: "dev_mid_backend".into(),
                target_role_id: "qa_lead".into(),
                proficiency: 0.6,
            })
            .await;
        assert!(result.success);
        let agent = sm.find_agent("dev_mid_backend").unwrap();
        assert!(agent.is_swapped);
        assert_eq!(agent.swap_state.as_ref().unwrap().target_role_id, "qa_lead");

        let mut executor = ActionExecutor::new(&mut sm);
        let missing = executor
            .execute(&Action::SwapAgentRole {
                agent_id: "ghost".into(),
                target_role_id: "qa_lead".into(),
                proficiency: 0.6,
            })
            .await;
        assert!(!missing.success);
    }

    #[tokio::test]
    async fn backlog_add_and_remove() {
        let mut sm = fixture_with_stories(stories()).await;
        let mut executor = ActionExecutor::new(&mut sm);
        let added = executor
            .execute(&Action::ModifyBacklog {
                op: BacklogOp::Add,
                story: Some(Story::new("INJECTED-1", "Injected")),
                story_id: None,
            })
            .await;
        assert!(added.success);
        let removed = executor
            .execute(&Action::ModifyBacklog {
                op: BacklogOp::Remove,
                story: None,
                story_id: Some("US-1".into()),
            })
            .await;
        assert!(removed.success);
        let backlog = sm.backlog.as_ref().unwrap();
        assert_eq!(backlog.stories().len(), 2);
        // US-1 returned, INJECTED-1 available.
        assert_eq!(backlog.remaining(), 1);
    }

    #[tokio::test]
    async fn depart_and_backfill_change_the_roster() {
        let mut sm = fixture_with_stories(stories()).await;
        let mut executor = ActionExecutor::new(&mut sm);
        let departed = executor
            .execute(&Action::ModifyTeamComposition {
                op: TeamOp::Depart,
                agent_id: Some("dev_junior_fullstack".into()),
                backfill_config: None,
            })
            .await;
        assert!(departed.success);
        assert_eq!(sm.agents.len(), 4);

        let mut executor = ActionExecutor::new(&mut sm);
        let backfilled = executor
            .execute(&Action::ModifyTeamComposition {
                op: TeamOp::Backfill,
                agent_id: None,
                backfill_config: Some(BackfillConfig {
                    role_id: Some("dev_backfill".into()),
                    seniority: Some("junior".into()),
                    ..Default::default()
                }),
            })
            .await;
        assert!(backfilled.success);
        assert_eq!(sm.agents.len(), 5);
        let newcomer = sm.find_agent("dev_backfill").unwrap();
        assert_eq!(newcomer.config.seniority, "junior");
        assert_eq!(newcomer.config.model, "mock");
    }

    #[tokio::test]
    async fn adjust_params_mutates_config_and_board() {
        let mut sm = fixture_with_stories(stories()).await;
        let mut executor = ActionExecutor::new(&mut sm);
        let mut limits = std::collections::BTreeMap::new();
        limits.insert("in_progress".to_string(), 2u32);
        let result = executor
            .execute(&Action::AdjustSprintParams {
                duration_minutes: Some(3),
                wip_limits: Some(limits),
            })
            .await;
        assert!(result.success);
        assert_eq!(sm.config.sprint_duration_minutes, 3);
        assert_eq!(sm.kanban.wip_limits["in_progress"], 2);
    }

    #[tokio::test]
    async fn batch_keeps_going_after_failures() {
        let mut sm = fixture_with_stories(stories()).await;
        let mut executor = ActionExecutor::new(&mut sm);
        let results = executor
            .execute_batch(&[
                Action::SwapAgentRole {
                    agent_id: "ghost".into(),
                    target_role_id: "po".into(),
                    proficiency: 0.5,
                },
                Action::AdjustSprintParams {
                    duration_minutes: Some(7),
                    wip_limits: None,
                },
            ])
            .await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[1].success);
        assert_eq!(sm.config.sprint_duration_minutes, 7);
    }

    #[test]
    fn spec_covers_all_five_variants() {
        let spec = &*ACTION_SPACE_SPEC;
        for name in [
            "inject_disturbance",
            "swap_agent_role",
            "modify_backlog",
            "modify_team_composition",
            "adjust_sprint_params",
        ] {
            assert!(spec.get(name).is_some(), "missing spec entry for {name}");
        }
        assert_eq!(
            spec["inject_disturbance"]["params"]["severity"]["high"],
            json!(1.0)
        );
    }

    #[test]
    fn actions_round_trip_through_serde() {
        let action = Action::ModifyBacklog {
            op: BacklogOp::Add,
            story: Some(Story::new("US-9", "Search")),
            story_id: None,
        };
        let text = serde_json::to_string(&action).unwrap();
        assert!(text.contains("\"action\":\"modify_backlog\""));
        let back: Action = serde_json::from_str(&text).unwrap();
        assert_eq!(back, action);
    }
}
