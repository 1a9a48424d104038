//! The sprint agent: identity, conversation memory, swap state, and an
//! optional decision tracer.

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::runtime::RuntimeResult;
use crate::tracer::{DecisionKind, DecisionTracer};

/// Static identity and model settings for one agent slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Stable role identifier, doubles as the agent id (e.g. `dev_lead`).
    pub role_id: String,
    pub name: String,
    /// Model identifier; `"mock"` for offline episodes.
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// `"junior"`, `"mid"`, or `"senior"`.
    pub seniority: String,
    pub primary_specialization: String,
    /// `"developer"`, `"tester"`, or `"leader"`.
    pub role_archetype: String,
    #[serde(default)]
    pub auxiliary_specializations: Vec<String>,
}

impl AgentConfig {
    /// Config with fixture defaults: mock model, mid backend developer.
    pub fn new(role_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role_id: role_id.into(),
            name: name.into(),
            model: "mock".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            seniority: "mid".to_string(),
            primary_specialization: "backend".to_string(),
            role_archetype: "developer".to_string(),
            auxiliary_specializations: Vec::new(),
        }
    }

    /// Primary plus auxiliary specializations.
    pub fn specializations(&self) -> Vec<String> {
        let mut specs = vec![self.primary_specialization.clone()];
        specs.extend(self.auxiliary_specializations.iter().cloned());
        specs
    }
}

/// One entry in an agent's conversation memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

/// Record of an in-flight profile swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapState {
    pub target_role_id: String,
    #[serde(default)]
    pub domain: String,
    pub proficiency: f64,
    pub sprint: u32,
}

/// A member of the sprint team.
///
/// Owns its conversation history and, when tracing is enabled, a per-sprint
/// [`DecisionTracer`]. All recording methods are no-ops when no tracer is
/// attached so the fixture code never branches on the tracing flag.
#[derive(Debug, Clone)]
pub struct SprintAgent {
    pub config: AgentConfig,
    pub conversation_history: Vec<ConversationTurn>,
    pub is_swapped: bool,
    pub swap_state: Option<SwapState>,
    tracer: Option<DecisionTracer>,
}

impl SprintAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            conversation_history: Vec::new(),
            is_swapped: false,
            swap_state: None,
            tracer: None,
        }
    }

    /// The agent id (same as the role id).
    pub fn agent_id(&self) -> &str {
        &self.config.role_id
    }

    pub fn tracer(&self) -> Option<&DecisionTracer> {
        self.tracer.as_ref()
    }

    pub fn tracer_mut(&mut self) -> Option<&mut DecisionTracer> {
        self.tracer.as_mut()
    }

    /// Attach a fresh tracer for the given sprint. A tracer already attached
    /// for the same sprint is kept (attachment is idempotent per sprint).
    pub fn attach_tracer(&mut self, sprint_num: u32) {
        let keep = self
            .tracer
            .as_ref()
            .map(|t| t.sprint_num() == sprint_num)
            .unwrap_or(false);
        if !keep {
            self.tracer = Some(DecisionTracer::new(self.config.role_id.clone(), sprint_num));
        }
    }

    /// Forward the current phase to the tracer, if attached.
    pub fn set_phase(&mut self, phase: &str) {
        if let Some(tracer) = self.tracer.as_mut() {
            tracer.set_phase(phase);
        }
    }

    /// Swap this agent to a different role profile.
    pub fn swap_to(&mut self, target_role_id: &str, domain: &str, proficiency: f64, sprint: u32) {
        self.is_swapped = true;
        self.swap_state = Some(SwapState {
            target_role_id: target_role_id.to_string(),
            domain: domain.to_string(),
            proficiency,
            sprint,
        });
    }

    /// Append a turn to the conversation memory.
    pub fn push_turn(&mut self, role: impl Into<String>, content: impl Into<String>) {
        self.conversation_history.push(ConversationTurn {
            role: role.into(),
            content: content.into(),
        });
    }

    /// Record a generation decision. Returns the decision id when a tracer
    /// is attached.
    pub fn record_generate(
        &mut self,
        context: &str,
        response: &str,
        kind: DecisionKind,
    ) -> Option<String> {
        self.tracer
            .as_mut()
            .map(|t| t.record_generate(context, response, kind, Map::new()))
    }

    /// Record a generation decision with metadata.
    pub fn record_generate_with_metadata(
        &mut self,
        context: &str,
        response: &str,
        kind: DecisionKind,
        metadata: Map<String, serde_json::Value>,
    ) -> Option<String> {
        self.tracer
            .as_mut()
            .map(|t| t.record_generate(context, response, kind, metadata))
    }

    /// Record a coding-task decision from a runtime result.
    pub fn record_coding_task(&mut self, context: &str, result: &RuntimeResult) -> Option<String> {
        self.tracer
            .as_mut()
            .map(|t| t.record_coding_task(context, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn attach_tracer_is_idempotent_per_sprint() {
        let mut agent = SprintAgent::new(AgentConfig::new("dev_a", "Dev A"));
        agent.attach_tracer(1);
        agent.set_phase("planning");
        agent.record_generate("ctx", "resp", DecisionKind::Generate);
        agent.attach_tracer(1);
        assert_eq!(agent.tracer().unwrap().decisions().len(), 1);
        // A new sprint replaces the tracer.
        agent.attach_tracer(2);
        assert!(agent.tracer().unwrap().decisions().is_empty());
    }

    #[test]
    fn recording_without_tracer_is_a_noop() {
        let mut agent = SprintAgent::new(AgentConfig::new("dev_a", "Dev A"));
        assert_eq!(agent.record_generate("ctx", "resp", DecisionKind::Generate), None);
    }

    #[test]
    fn swap_to_records_state() {
        let mut agent = SprintAgent::new(AgentConfig::new("dev_a", "Dev A"));
        agent.swap_to("qa_lead", "testing", 0.7, 2);
        assert!(agent.is_swapped);
        let swap = agent.swap_state.as_ref().unwrap();
        assert_eq!(swap.target_role_id, "qa_lead");
        assert_eq!(swap.sprint, 2);
    }

    #[test]
    fn specializations_include_auxiliary() {
        let mut config = AgentConfig::new("dev_a", "Dev A");
        config.auxiliary_specializations = vec!["devops".to_string()];
        assert_eq!(config.specializations(), vec!["backend", "devops"]);
    }
}
