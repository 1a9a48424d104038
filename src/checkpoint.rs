//! Mid-episode state checkpointing for curriculum replay.
//!
//! Checkpoints are indented JSON files at
//! `{root}/{episode_id}/s{sprint:02}-{phase}.json`, written atomically
//! (write-then-rename) and read-only thereafter. The zero-padded sprint
//! prefix makes lexicographic filename order coincide with chronological
//! order. A 16-hex-char SHA-256 prefix of the sorted-key JSON config tags
//! each checkpoint; restore warns on mismatch but still applies state
//! best-effort.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::config::ExperimentConfig;
use crate::error::{Error, Result};
use crate::sprint::{
    ConversationTurn, KanbanSnapshot, MetaLearning, SprintManager, SprintRecord, SwapState,
};
use crate::tracer::Decision;

/// Captured state of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStateSnapshot {
    pub agent_id: String,
    pub role_id: String,
    pub name: String,
    pub seniority: String,
    #[serde(default)]
    pub conversation_history: Vec<ConversationTurn>,
    pub is_swapped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_state: Option<SwapState>,
}

/// Remaining/selected backlog bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacklogState {
    pub remaining: usize,
    #[serde(default)]
    pub selected: Vec<String>,
}

/// Serializable snapshot of mid-episode state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub episode_id: String,
    pub sprint_num: u32,
    pub phase: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub kanban_snapshot: KanbanSnapshot,
    #[serde(default)]
    pub agent_states: Vec<AgentStateSnapshot>,
    #[serde(default)]
    pub sprint_results: Vec<SprintRecord>,
    #[serde(default)]
    pub meta_learnings: Vec<MetaLearning>,
    /// Agent id → full decision list.
    #[serde(default)]
    pub tracer_states: BTreeMap<String, Vec<Decision>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backlog_state: Option<BacklogState>,
    #[serde(default)]
    pub config_hash: String,
}

/// Manages save/restore of mid-episode checkpoints under a root directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl Default for CheckpointManager {
    fn default() -> Self {
        Self::new("/tmp/sprintgym-checkpoints")
    }
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory for checkpoint storage.
    pub fn checkpoint_dir(&self) -> &Path {
        &self.dir
    }

    /// Save a checkpoint of the fixture's current state. Parent directories
    /// are created on demand; the file is written atomically.
    ///
    /// Returns the path of the written checkpoint.
    pub async fn save(
        &self,
        episode_id: &str,
        sm: &SprintManager,
        sprint_num: u32,
        phase: &str,
    ) -> Result<PathBuf> {
        let kanban_snapshot = sm.kanban_snapshot().await;

        let agent_states = sm
            .agents
            .iter()
            .map(|agent| AgentStateSnapshot {
                agent_id: agent.agent_id().to_string(),
                role_id: agent.config.role_id.clone(),
                name: agent.config.name.clone(),
                seniority: agent.config.seniority.clone(),
                conversation_history: agent.conversation_history.clone(),
                is_swapped: agent.is_swapped,
                swap_state: agent.swap_state.clone(),
            })
            .collect();

        let tracer_states: BTreeMap<String, Vec<Decision>> = sm
            .agents
            .iter()
            .filter_map(|agent| {
                agent
                    .tracer()
                    .map(|t| (agent.agent_id().to_string(), t.decisions().to_vec()))
            })
            .collect();

        let backlog_state = sm.backlog.as_ref().map(|backlog| BacklogState {
            remaining: backlog.remaining(),
            selected: backlog.selected_ids().iter().cloned().collect(),
        });

        let checkpoint = Checkpoint {
            episode_id: episode_id.to_string(),
            sprint_num,
            phase: phase.to_string(),
            timestamp: Utc::now(),
            kanban_snapshot,
            agent_states,
            sprint_results: sm.sprint_results().to_vec(),
            meta_learnings: sm.db.meta_learnings().to_vec(),
            tracer_states,
            backlog_state,
            config_hash: Self::config_hash(&sm.config),
        };

        let ep_dir = self.dir.join(episode_id);
        tokio::fs::create_dir_all(&ep_dir).await?;
        let path = ep_dir.join(format!("s{sprint_num:02}-{phase}.json"));
        let body = serde_json::to_string_pretty(&checkpoint)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(episode_id, path = %path.display(), "checkpoint saved");
        Ok(path)
    }

    /// Restore fixture state from a checkpoint file.
    ///
    /// A config-hash mismatch is logged, not fatal; restore proceeds
    /// best-effort. Agent states for ids not present in the fixture are
    /// skipped. Returns the parsed checkpoint.
    pub async fn restore(
        &self,
        checkpoint_path: &Path,
        sm: &mut SprintManager,
    ) -> Result<Checkpoint> {
        let body = tokio::fs::read_to_string(checkpoint_path)
            .await
            .map_err(|e| {
                Error::Checkpoint(format!("cannot read {}: {e}", checkpoint_path.display()))
            })?;
        let checkpoint: Checkpoint = serde_json::from_str(&body)?;

        let current_hash = Self::config_hash(&sm.config);
        if !checkpoint.config_hash.is_empty() && checkpoint.config_hash != current_hash {
            tracing::warn!(
                checkpoint = %checkpoint.config_hash,
                current = %current_hash,
                "config hash mismatch; state may not restore correctly"
            );
        }

        // Kanban cards back into the mock database.
        if sm.db.is_mock() {
            let cards = sm.db.cards_mut();
            cards.clear();
            for column_cards in checkpoint.kanban_snapshot.values() {
                cards.extend(column_cards.iter().cloned());
            }
        }

        // Agent conversation history and swap state; unknown ids skipped.
        for state in &checkpoint.agent_states {
            let Some(agent) = sm.find_agent_mut(&state.agent_id) else {
                continue;
            };
            agent.conversation_history = state.conversation_history.clone();
            agent.is_swapped = state.is_swapped;
            agent.swap_state = state.swap_state.clone();
        }

        *sm.sprint_results_mut() = checkpoint.sprint_results.clone();

        if sm.db.is_mock() {
            *sm.db.meta_learnings_mut() = checkpoint.meta_learnings.clone();
        }

        // Tracer decisions for agents that have a tracer attached.
        for agent in &mut sm.agents {
            let agent_id = agent.agent_id().to_string();
            if let (Some(tracer), Some(decisions)) =
                (agent.tracer_mut(), checkpoint.tracer_states.get(&agent_id))
            {
                tracer.clear();
                for decision in decisions {
                    tracer.record(decision.clone());
                }
            }
        }

        if let (Some(backlog), Some(state)) =
            (sm.backlog.as_mut(), checkpoint.backlog_state.as_ref())
        {
            backlog.set_selected_ids(state.selected.iter().cloned().collect::<BTreeSet<_>>());
        }

        Ok(checkpoint)
    }

    /// All checkpoint files for an episode, sorted by filename. Zero-padded
    /// sprint numbers make this chronological order.
    pub fn list_checkpoints(&self, episode_id: &str) -> Vec<PathBuf> {
        let pattern = self.dir.join(episode_id).join("s*-*.json");
        let mut paths: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
            .map(|entries| entries.filter_map(std::result::Result::ok).collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    /// 16-char lowercase hex prefix of SHA-256 over the JSON-serialized
    /// config. serde_json's default object map is ordered, so keys are
    /// sorted without extra work.
    pub fn config_hash(config: &ExperimentConfig) -> String {
        let serialized = serde_json::to_value(config)
            .unwrap_or(Value::Null)
            .to_string();
        let digest = Sha256::digest(serialized.as_bytes());
        digest
            .iter()
            .take(8)
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sprint::tests::fixture_with_stories;
    use crate::sprint::Story;
    use pretty_assertions::assert_eq;

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
    async fn save_restore_round_trips_fixture_state() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path());

        let mut sm = fixture_with_stories(stories()).await;
        sm.set_agent_phase("planning");
        sm.run_planning(1).await.unwrap();
        sm.set_agent_phase("development");
        sm.run_development(1, None).await.unwrap();
        sm.run_retrospective(1).await.unwrap();
        sm.find_agent_mut("po")
            .unwrap()
            .push_turn("user", "ship it");

        let path = manager.save("ep-001", &sm, 1, "development").await.unwrap();
        assert!(path.ends_with("ep-001/s01-development.json"));

        // Restore into a fresh fixture.
        let mut fresh = fixture_with_stories(stories()).await;
        let checkpoint = manager.restore(&path, &mut fresh).await.unwrap();
        assert_eq!(checkpoint.episode_id, "ep-001");
        assert_eq!(fresh.kanban_snapshot().await, sm.kanban_snapshot().await);
        assert_eq!(fresh.sprint_results(), sm.sprint_results());
        assert_eq!(fresh.db.meta_learnings(), sm.db.meta_learnings());
        assert_eq!(
            fresh.backlog.as_ref().unwrap().selected_ids(),
            sm.backlog.as_ref().unwrap().selected_ids()
        );
        for (restored, original) in fresh.agents.iter().zip(sm.agents.iter()) {
            assert_eq!(restored.conversation_history, original.conversation_history);
            assert_eq!(
                restored.tracer().unwrap().decisions(),
                original.tracer().unwrap().decisions()
            );
        }
    }

    #[tokio::test]
    async fn restore_skips_unknown_agents() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path());

        let mut sm = fixture_with_stories(stories()).await;
        sm.run_planning(1).await.unwrap();
        let path = manager.save("ep-002", &sm, 1, "planning").await.unwrap();

        let mut fresh = fixture_with_stories(stories()).await;
        fresh.agents.retain(|a| a.agent_id() != "po");
        let checkpoint = manager.restore(&path, &mut fresh).await.unwrap();
        assert_eq!(checkpoint.agent_states.len(), 5);
        assert_eq!(fresh.agents.len(), 4);
    }

    #[tokio::test]
    async fn config_hash_mismatch_is_non_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path());

        let mut sm = fixture_with_stories(stories()).await;
        sm.run_planning(1).await.unwrap();
        let path = manager.save("ep-003", &sm, 1, "planning").await.unwrap();

        let mut fresh = fixture_with_stories(stories()).await;
        fresh.config.sprint_duration_minutes = 99;
        let checkpoint = manager.restore(&path, &mut fresh).await.unwrap();
        assert_ne!(
            checkpoint.config_hash,
            CheckpointManager::config_hash(&fresh.config)
        );
        // State still restored.
        assert_eq!(fresh.kanban_snapshot().await, sm.kanban_snapshot().await);
    }

    #[tokio::test]
    async fn list_checkpoints_is_lexicographic_and_chronological() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path());
        let sm = fixture_with_stories(stories()).await;

        manager.save("ep-001", &sm, 1, "planning").await.unwrap();
        manager.save("ep-001", &sm, 1, "development").await.unwrap();
        manager.save("ep-001", &sm, 2, "planning").await.unwrap();

        let names: Vec<String> = manager
            .list_checkpoints("ep-001")
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(
            names,
            vec![
                "s01-development.json".to_string(),
                "s01-planning.json".to_string(),
                "s02-planning.json".to_string(),
            ]
        );

        assert!(manager.list_checkpoints("ep-unknown").is_empty());
    }

    #[test]
    fn config_hash_is_stable_and_16_chars() {
        let config = crate::config::ExperimentConfigBuilder::new().build();
        let a = CheckpointManager::config_hash(&config);
        let b = CheckpointManager::config_hash(&config);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
