//! Structured decision traces with deterministic IDs.
//!
//! Every agent choice is recorded as a [`Decision`] with a unique ID of the
//! form `{agent_id}-s{sprint:02}-{phase}-{seq:03}`, e.g.
//! `alex_dev-s03-planning-001`. The sequence counter is per-phase and resets
//! on every phase change, which makes IDs replayable without any process-wide
//! counter. Traces are exported per agent as `{dir}/{agent_id}.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::Result;
use crate::runtime::RuntimeResult;

/// Maximum stored length of a decision's input context, in characters.
const MAX_CONTEXT_CHARS: usize = 500;
/// Maximum stored length of a decision's action content, in characters.
const MAX_CONTENT_CHARS: usize = 1000;

/// The kind of action a decision represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Plain text generation (planning notes, retro items, answers).
    Generate,
    /// A coding task executed through an agent runtime.
    ExecuteCodingTask,
    /// A pairing-checkpoint judgement (approve/revise).
    CheckpointDecision,
    /// A question raised back to the team.
    AskQuestion,
}

impl DecisionKind {
    /// Wire name of the kind, matching its serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::ExecuteCodingTask => "execute_coding_task",
            Self::CheckpointDecision => "checkpoint_decision",
            Self::AskQuestion => "ask_question",
        }
    }
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded agent decision. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Deterministic ID: `{agent_id}-s{sprint:02}-{phase}-{seq:03}`.
    pub decision_id: String,
    /// UTC timestamp at record time (RFC-3339 on the wire).
    pub timestamp: DateTime<Utc>,
    /// Phase the decision was made in.
    pub phase: String,
    /// Truncated input context (first 500 chars).
    pub context: String,
    /// What kind of action this was.
    pub action_type: DecisionKind,
    /// Truncated output (first 1000 chars).
    pub action_content: String,
    /// Full response text, unbounded (for models that produce CoT).
    pub reasoning_trace: String,
    /// Populated post-hoc by external pipelines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    /// Free-form metadata (tool calls, files changed, turn counts).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Decision {
    /// Build a decision with the given ID and content, defaulting everything
    /// else. Useful for tests and external scoring pipelines.
    pub fn with_content(decision_id: impl Into<String>, action_content: impl Into<String>) -> Self {
        let action_content = action_content.into();
        Self {
            decision_id: decision_id.into(),
            timestamp: Utc::now(),
            phase: String::new(),
            context: String::new(),
            action_type: DecisionKind::Generate,
            reasoning_trace: action_content.clone(),
            action_content,
            outcome: None,
            metadata: Map::new(),
        }
    }

    /// A compact summary of this decision for observations and phase results.
    pub fn summary(&self, agent_id: &str) -> DecisionSummary {
        DecisionSummary {
            decision_id: self.decision_id.clone(),
            agent_id: agent_id.to_string(),
            phase: self.phase.clone(),
            action_type: self.action_type,
            timestamp: self.timestamp,
        }
    }
}

/// Compact decision view carried in phase results and observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSummary {
    pub decision_id: String,
    pub agent_id: String,
    pub phase: String,
    pub action_type: DecisionKind,
    pub timestamp: DateTime<Utc>,
}

/// Records agent decisions and generates unique decision IDs.
///
/// Lifecycle: one tracer per agent per sprint. The sprint fixture creates
/// tracers at sprint start, calls [`set_phase`](Self::set_phase) at each
/// ceremony boundary, and exports traces at sprint end.
#[derive(Debug, Clone)]
pub struct DecisionTracer {
    agent_id: String,
    sprint_num: u32,
    phase: String,
    seq: u32,
    decisions: Vec<Decision>,
}

impl DecisionTracer {
    /// Create an empty tracer for an agent and sprint. The phase starts as
    /// `"unknown"` until the first [`set_phase`](Self::set_phase).
    pub fn new(agent_id: impl Into<String>, sprint_num: u32) -> Self {
        Self {
            agent_id: agent_id.into(),
            sprint_num,
            phase: "unknown".to_string(),
            seq: 0,
            decisions: Vec::new(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn sprint_num(&self) -> u32 {
        self.sprint_num
    }

    pub fn current_phase(&self) -> &str {
        &self.phase
    }

    /// Recorded decisions, in insertion order.
    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    /// The most recent decision ID, or empty string if none.
    pub fn last_decision_id(&self) -> &str {
        self.decisions
            .last()
            .map(|d| d.decision_id.as_str())
            .unwrap_or("")
    }

    /// Set the current sprint phase. Resets the per-phase sequence counter.
    pub fn set_phase(&mut self, phase: impl Into<String>) {
        self.phase = phase.into();
        self.seq = 0;
    }

    /// Generate and return the next decision ID (pre-increments the sequence).
    pub fn next_decision_id(&mut self) -> String {
        self.seq += 1;
        format!(
            "{}-s{:02}-{}-{:03}",
            self.agent_id, self.sprint_num, self.phase, self.seq
        )
    }

    /// Append a decision to the trace log.
    pub fn record(&mut self, decision: Decision) {
        self.decisions.push(decision);
    }

    /// Drop all recorded decisions. Used when restoring from a checkpoint.
    pub fn clear(&mut self) {
        self.decisions.clear();
    }

    /// Create and record a decision from a plain generation. Context and
    /// content are truncated to 500/1000 chars; truncation is silent.
    ///
    /// Returns the assigned decision ID.
    pub fn record_generate(
        &mut self,
        context: &str,
        response: &str,
        action_type: DecisionKind,
        metadata: Map<String, Value>,
    ) -> String {
        let decision_id = self.next_decision_id();
        self.record(Decision {
            decision_id: decision_id.clone(),
            timestamp: Utc::now(),
            phase: self.phase.clone(),
            context: truncate_chars(context, MAX_CONTEXT_CHARS),
            action_type,
            action_content: truncate_chars(response, MAX_CONTENT_CHARS),
            reasoning_trace: response.to_string(),
            outcome: None,
            metadata,
        });
        decision_id
    }

    /// Create and record a decision from a runtime coding-task result,
    /// capturing tool calls, files changed, and turn count as metadata.
    ///
    /// Returns the assigned decision ID.
    pub fn record_coding_task(&mut self, context: &str, result: &RuntimeResult) -> String {
        let decision_id = self.next_decision_id();
        let mut metadata = Map::new();
        metadata.insert(
            "files_changed".into(),
            Value::from(result.files_changed.clone()),
        );
        metadata.insert(
            "tool_calls".into(),
            serde_json::to_value(&result.tool_calls).unwrap_or(Value::Array(Vec::new())),
        );
        metadata.insert("turns".into(), Value::from(result.turns));
        metadata.insert("success".into(), Value::from(result.success));
        self.record(Decision {
            decision_id: decision_id.clone(),
            timestamp: Utc::now(),
            phase: self.phase.clone(),
            context: truncate_chars(context, MAX_CONTEXT_CHARS),
            action_type: DecisionKind::ExecuteCodingTask,
            action_content: truncate_chars(&result.content, MAX_CONTENT_CHARS),
            reasoning_trace: result.content.clone(),
            outcome: None,
            metadata,
        });
        decision_id
    }

    /// Serialize the full trace for JSON export.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "agent_id": self.agent_id,
            "sprint": self.sprint_num,
            "decisions": self.decisions,
        })
    }

    /// Write the trace to `{output_dir}/{agent_id}.json`, creating the
    /// directory if absent.
    pub async fn write_trace(&self, output_dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(output_dir).await?;
        let path = output_dir.join(format!("{}.json", self.agent_id));
        let body = serde_json::to_string_pretty(&self.to_json())?;
        tokio::fs::write(&path, body).await?;
        tracing::debug!(agent_id = %self.agent_id, path = %path.display(), "wrote decision trace");
        Ok(())
    }
}

/// Truncate a string to at most `max` characters, respecting char boundaries.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decision_ids_are_deterministic_and_zero_padded() {
        let mut tracer = DecisionTracer::new("alex_dev", 3);
        tracer.set_phase("planning");
        assert_eq!(tracer.next_decision_id(), "alex_dev-s03-planning-001");
        assert_eq!(tracer.next_decision_id(), "alex_dev-s03-planning-002");
        assert_eq!(tracer.next_decision_id(), "alex_dev-s03-planning-003");
    }

    #[test]
    fn sequence_resets_on_phase_change() {
        let mut tracer = DecisionTracer::new("dev_a", 1);
        tracer.set_phase("planning");
        tracer.next_decision_id();
        tracer.next_decision_id();
        tracer.set_phase("development");
        assert_eq!(tracer.next_decision_id(), "dev_a-s01-development-001");
        // Returning to a previous phase restarts the counter as well.
        tracer.set_phase("planning");
        assert_eq!(tracer.next_decision_id(), "dev_a-s01-planning-001");
    }

    #[test]
    fn phase_defaults_to_unknown() {
        let mut tracer = DecisionTracer::new("dev_a", 2);
        assert_eq!(tracer.current_phase(), "unknown");
        assert_eq!(tracer.next_decision_id(), "dev_a-s02-unknown-001");
    }

    #[test]
    fn record_generate_truncates_silently() {
        let mut tracer = DecisionTracer::new("dev_a", 1);
        tracer.set_phase("development");
        let long_context = "c".repeat(600);
        let long_response = "r".repeat(1500);
        let id = tracer.record_generate(
            &long_context,
            &long_response,
            DecisionKind::Generate,
            Map::new(),
        );
        assert_eq!(id, "dev_a-s01-development-001");
        let d = &tracer.decisions()[0];
        assert_eq!(d.context.chars().count(), 500);
        assert_eq!(d.action_content.chars().count(), 1000);
        // Full reasoning trace is never truncated.
        assert_eq!(d.reasoning_trace.chars().count(), 1500);
    }

    #[test]
    fn record_coding_task_captures_metadata() {
        let mut tracer = DecisionTracer::new("dev_a", 1);
        tracer.set_phase("development");
        let result = RuntimeResult {
            success: true,
            content: "done".into(),
            turns: 4,
            tool_calls: Vec::new(),
            files_changed: vec!["src/api.rs".into()],
            error: None,
            metadata: Map::new(),
        };
        tracer.record_coding_task("implement story US-01", &result);
        let d = &tracer.decisions()[0];
        assert_eq!(d.action_type, DecisionKind::ExecuteCodingTask);
        assert_eq!(d.metadata["files_changed"], serde_json::json!(["src/api.rs"]));
        assert_eq!(d.metadata["turns"], serde_json::json!(4));
    }

    #[test]
    fn last_decision_id_tracks_latest() {
        let mut tracer = DecisionTracer::new("dev_a", 1);
        assert_eq!(tracer.last_decision_id(), "");
        tracer.set_phase("qa_review");
        tracer.record_generate("ctx", "resp", DecisionKind::AskQuestion, Map::new());
        assert_eq!(tracer.last_decision_id(), "dev_a-s01-qa_review-001");
    }

    #[test]
    fn to_json_has_trace_shape() {
        let mut tracer = DecisionTracer::new("qa_lead", 2);
        tracer.set_phase("qa_review");
        tracer.record_generate("ctx", "resp", DecisionKind::Generate, Map::new());
        let value = tracer.to_json();
        assert_eq!(value["agent_id"], "qa_lead");
        assert_eq!(value["sprint"], 2);
        assert_eq!(value["decisions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn write_trace_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sprint-01").join("traces");
        let mut tracer = DecisionTracer::new("po", 1);
        tracer.set_phase("planning");
        tracer.record_generate("ctx", "resp", DecisionKind::Generate, Map::new());
        tracer.write_trace(&target).await.unwrap();
        let written = std::fs::read_to_string(target.join("po.json")).unwrap();
        let parsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed["agent_id"], "po");
    }
}
