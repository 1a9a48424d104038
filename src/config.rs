//! Experiment configuration and its fluent builder.
//!
//! [`ExperimentConfigBuilder`] accumulates partial settings and normalizes
//! them into an [`ExperimentConfig`] at [`build`](ExperimentConfigBuilder::build)
//! time. The builder never reads disk; configuration-file parsing belongs to
//! outer layers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::runtime::RuntimeConfig;

/// Per-agent model/runtime selection, keyed by agent role id in
/// [`ExperimentConfig::agents`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentModelConfig {
    /// Display name override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Model identifier passed through to the runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Runtime type name; resolved against the runtime registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Disturbance injection settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisturbanceSettings {
    pub enabled: bool,
    /// Per-disturbance-type firing frequency in [0, 1].
    #[serde(default)]
    pub frequencies: BTreeMap<String, f64>,
    /// Bounds limiting how much of the team a disturbance may touch.
    #[serde(default)]
    pub blast_radius_controls: BTreeMap<String, f64>,
}

/// Agent attrition (turnover) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttritionSettings {
    pub enabled: bool,
    pub starts_after_sprint: u32,
    pub probability_per_sprint: f64,
    pub backfill_enabled: bool,
    pub backfill_delay_sprints: u32,
    #[serde(default)]
    pub protect_roles: Vec<String>,
    pub max_departures_per_sprint: u32,
}

impl Default for AttritionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            starts_after_sprint: 2,
            probability_per_sprint: 0.05,
            backfill_enabled: true,
            backfill_delay_sprints: 1,
            protect_roles: Vec::new(),
            max_departures_per_sprint: 1,
        }
    }
}

/// New-agent onboarding settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingSettings {
    pub duration_sprints: u32,
    pub max_story_points_first_sprint: u32,
    pub velocity_penalty_first_sprint: f64,
}

impl Default for OnboardingSettings {
    fn default() -> Self {
        Self {
            duration_sprints: 2,
            max_story_points_first_sprint: 3,
            velocity_penalty_first_sprint: 0.5,
        }
    }
}

/// Profile swapping settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSwapSettings {
    /// `"none"`, `"scenario"`, or `"free"`.
    pub mode: String,
    #[serde(default)]
    pub allowed_scenarios: Vec<String>,
    #[serde(default)]
    pub penalties: BTreeMap<String, f64>,
}

impl Default for ProfileSwapSettings {
    fn default() -> Self {
        Self {
            mode: "none".to_string(),
            allowed_scenarios: Vec::new(),
            penalties: BTreeMap::new(),
        }
    }
}

/// Cross-team coordination settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationSettings {
    pub enabled: bool,
    /// Use an LLM coordinator for portfolio triage instead of the heuristic.
    pub llm_triage: bool,
}

impl Default for CoordinationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            llm_triage: false,
        }
    }
}

/// Message bus settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagingSettings {
    /// `"memory"` or `"redis"`.
    pub backend: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    pub history_size: usize,
    pub log_messages: bool,
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            redis_url: None,
            history_size: 100,
            log_messages: false,
        }
    }
}

/// Normalized experiment configuration consumed by the sprint fixture and
/// the episode harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    pub sprint_duration_minutes: u32,
    pub num_simulated_days: u32,
    /// Whether decision tracers are attached to agents.
    pub tracing_enabled: bool,
    pub database_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_config_dir: Option<PathBuf>,
    /// Default vLLM endpoint for `local_vllm` runtimes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_endpoint: Option<String>,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentModelConfig>,
    #[serde(default)]
    pub runtimes: BTreeMap<String, RuntimeConfig>,
    #[serde(default)]
    pub disturbances: DisturbanceSettings,
    #[serde(default)]
    pub attrition: AttritionSettings,
    #[serde(default)]
    pub onboarding: OnboardingSettings,
    #[serde(default)]
    pub profile_swapping: ProfileSwapSettings,
    pub workspace_root: PathBuf,
    /// `"per_story"` or `"shared"`.
    pub workspace_mode: String,
    #[serde(default)]
    pub coordination: CoordinationSettings,
    #[serde(default)]
    pub messaging: MessagingSettings,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfigBuilder::new().build()
    }
}

/// Fluent builder for [`ExperimentConfig`].
///
/// ```
/// use sprintgym_core::config::ExperimentConfigBuilder;
///
/// let config = ExperimentConfigBuilder::new()
///     .name("episode-42")
///     .sprint_duration(5)
///     .database_url("mock://")
///     .tracing(true)
///     .build();
/// assert_eq!(config.name, "episode-42");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExperimentConfigBuilder {
    name: Option<String>,
    sprint_duration_minutes: Option<u32>,
    num_simulated_days: Option<u32>,
    tracing_enabled: Option<bool>,
    database_url: Option<String>,
    team_config_dir: Option<String>,
    runtime_endpoint: Option<String>,
    agents: BTreeMap<String, AgentModelConfig>,
    runtimes: BTreeMap<String, RuntimeConfig>,
    disturbances: Option<DisturbanceSettings>,
    attrition: Option<AttritionSettings>,
    onboarding: Option<OnboardingSettings>,
    profile_swapping: Option<ProfileSwapSettings>,
    workspace_root: Option<String>,
    workspace_mode: Option<String>,
    coordination: Option<CoordinationSettings>,
    messaging: Option<MessagingSettings>,
}

impl ExperimentConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the experiment name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set sprint duration in minutes. Zero makes mock development loops
    /// exit immediately.
    pub fn sprint_duration(mut self, minutes: u32) -> Self {
        self.sprint_duration_minutes = Some(minutes);
        self
    }

    /// Set the number of simulated working days per sprint.
    pub fn num_simulated_days(mut self, days: u32) -> Self {
        self.num_simulated_days = Some(days);
        self
    }

    /// Enable or disable decision tracing.
    pub fn tracing(mut self, enabled: bool) -> Self {
        self.tracing_enabled = Some(enabled);
        self
    }

    /// Set the database URL (`mock://` for the in-memory fixture).
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Set the team-config directory. Tilde-expanded at build time.
    pub fn team_config_dir(mut self, path: impl Into<String>) -> Self {
        self.team_config_dir = Some(path.into());
        self
    }

    /// Set the default vLLM endpoint URL.
    pub fn vllm_endpoint(mut self, url: impl Into<String>) -> Self {
        self.runtime_endpoint = Some(url.into());
        self
    }

    /// Set per-agent model/runtime configurations.
    pub fn agents(mut self, configs: BTreeMap<String, AgentModelConfig>) -> Self {
        self.agents = configs;
        self
    }

    /// Set named runtime configurations.
    pub fn runtimes(mut self, configs: BTreeMap<String, RuntimeConfig>) -> Self {
        self.runtimes = configs;
        self
    }

    /// Configure disturbance injection.
    pub fn disturbances(
        mut self,
        enabled: bool,
        frequencies: BTreeMap<String, f64>,
        blast_radius_controls: BTreeMap<String, f64>,
    ) -> Self {
        self.disturbances = Some(DisturbanceSettings {
            enabled,
            frequencies,
            blast_radius_controls,
        });
        self
    }

    /// Configure agent attrition.
    pub fn attrition(mut self, settings: AttritionSettings) -> Self {
        self.attrition = Some(settings);
        self
    }

    /// Configure new-agent onboarding.
    pub fn onboarding(mut self, settings: OnboardingSettings) -> Self {
        self.onboarding = Some(settings);
        self
    }

    /// Configure profile swapping.
    pub fn profile_swapping(mut self, settings: ProfileSwapSettings) -> Self {
        self.profile_swapping = Some(settings);
        self
    }

    /// Configure the code-generation workspace. Tilde-expanded at build time.
    pub fn workspace(mut self, root: impl Into<String>, mode: impl Into<String>) -> Self {
        self.workspace_root = Some(root.into());
        self.workspace_mode = Some(mode.into());
        self
    }

    /// Configure cross-team coordination.
    pub fn coordination(mut self, settings: CoordinationSettings) -> Self {
        self.coordination = Some(settings);
        self
    }

    /// Configure the message bus.
    pub fn messaging(mut self, settings: MessagingSettings) -> Self {
        self.messaging = Some(settings);
        self
    }

    /// Construct the [`ExperimentConfig`], filling unset values with their
    /// documented defaults.
    pub fn build(self) -> ExperimentConfig {
        ExperimentConfig {
            name: self.name.unwrap_or_else(|| "experiment".to_string()),
            sprint_duration_minutes: self.sprint_duration_minutes.unwrap_or(10),
            num_simulated_days: self.num_simulated_days.unwrap_or(5),
            tracing_enabled: self.tracing_enabled.unwrap_or(false),
            database_url: self.database_url.unwrap_or_else(|| "mock://".to_string()),
            team_config_dir: self.team_config_dir.as_deref().map(expand_path),
            runtime_endpoint: self.runtime_endpoint,
            agents: self.agents,
            runtimes: self.runtimes,
            disturbances: self.disturbances.unwrap_or_default(),
            attrition: self.attrition.unwrap_or_default(),
            onboarding: self.onboarding.unwrap_or_default(),
            profile_swapping: self.profile_swapping.unwrap_or_default(),
            workspace_root: expand_path(
                self.workspace_root
                    .as_deref()
                    .unwrap_or("/tmp/agent-workspace"),
            ),
            workspace_mode: self.workspace_mode.unwrap_or_else(|| "per_story".to_string()),
            coordination: self.coordination.unwrap_or_default(),
            messaging: self.messaging.unwrap_or_default(),
        }
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_documented_values() {
        let config = ExperimentConfigBuilder::new().build();
        assert_eq!(config.name, "experiment");
        assert_eq!(config.sprint_duration_minutes, 10);
        assert_eq!(config.num_simulated_days, 5);
        assert!(!config.tracing_enabled);
        assert_eq!(config.database_url, "mock://");
        assert_eq!(config.workspace_mode, "per_story");
        assert_eq!(config.messaging.backend, "memory");
        assert_eq!(config.profile_swapping.mode, "none");
        assert!(!config.disturbances.enabled);
    }

    #[test]
    fn fluent_setters_override_defaults() {
        let mut freqs = BTreeMap::new();
        freqs.insert("flaky_test".to_string(), 0.3);
        let config = ExperimentConfigBuilder::new()
            .name("dojo-episode-42")
            .sprint_duration(5)
            .num_simulated_days(1)
            .database_url("mock://")
            .tracing(true)
            .disturbances(true, freqs.clone(), BTreeMap::new())
            .workspace("/tmp/ws", "shared")
            .build();
        assert_eq!(config.name, "dojo-episode-42");
        assert_eq!(config.sprint_duration_minutes, 5);
        assert_eq!(config.num_simulated_days, 1);
        assert!(config.tracing_enabled);
        assert!(config.disturbances.enabled);
        assert_eq!(config.disturbances.frequencies, freqs);
        assert_eq!(config.workspace_root, PathBuf::from("/tmp/ws"));
        assert_eq!(config.workspace_mode, "shared");
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = ExperimentConfigBuilder::new()
            .name("roundtrip")
            .sprint_duration(15)
            .tracing(true)
            .build();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ExperimentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn agent_configs_are_keyed_by_role() {
        let mut agents = BTreeMap::new();
        agents.insert(
            "dev_lead".to_string(),
            AgentModelConfig {
                name: Some("Lead".to_string()),
                model: Some("mock".to_string()),
                runtime: Some("local_vllm".to_string()),
                ..Default::default()
            },
        );
        let config = ExperimentConfigBuilder::new().agents(agents).build();
        assert_eq!(
            config.agents["dev_lead"].runtime.as_deref(),
            Some("local_vllm")
        );
    }
}
