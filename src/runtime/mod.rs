//! Pluggable LLM runtime backends and the process-wide registry.
//!
//! A runtime is anything implementing [`AgentRuntime`]: it executes a task
//! with an agentic tool loop and reports a [`RuntimeResult`]. Backends are
//! registered by name in a process-wide registry initialized lazily with the
//! two defaults, `local_vllm` and `anthropic`. Re-registering a name
//! overwrites the previous factory; this is allowed and intentional so test
//! harnesses can swap backends in place.
//!
//! Tool *implementations* live outside this crate. Runtimes receive trait
//! objects built by a pluggable tool factory; the default factory builds
//! none.

pub mod anthropic;
pub mod vllm;

pub use anthropic::AnthropicRuntime;
pub use vllm::VllmRuntime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, LazyLock, RwLock};

use crate::config::AgentModelConfig;
use crate::error::{Error, Result};

/// Result from a runtime execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeResult {
    pub success: bool,
    pub content: String,
    #[serde(default)]
    pub turns: u32,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub params: Value,
}

/// Outcome of one tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutcome {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub files_changed: Vec<String>,
}

/// A tool an agent runtime can invoke during its loop.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn invoke(&self, params: &Value) -> ToolOutcome;
}

/// An LLM execution backend.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Execute a task with an agentic tool loop: generate, parse tool calls,
    /// execute them, feed results back, repeat until done or `max_turns`.
    ///
    /// Transport and tool failures are reported through the result
    /// (`success == false`), never as panics or errors.
    async fn execute_task(
        &self,
        system_prompt: &str,
        user_message: &str,
        max_turns: u32,
    ) -> RuntimeResult;

    /// The registry name this runtime answers to.
    fn runtime_type(&self) -> &'static str;
}

impl std::fmt::Debug for dyn AgentRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("runtime_type", &self.runtime_type())
            .finish()
    }
}

/// Configuration for a runtime backend, stored per name in
/// [`ExperimentConfig::runtimes`](crate::config::ExperimentConfig::runtimes).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Factory building a runtime from its config and tool set.
pub type RuntimeFactory =
    Arc<dyn Fn(&RuntimeConfig, Vec<Arc<dyn Tool>>) -> Arc<dyn AgentRuntime> + Send + Sync>;

/// Factory building tools from names, a workspace root, and tool config.
pub type ToolFactory =
    Arc<dyn Fn(&[String], &Path, &Map<String, Value>) -> Vec<Arc<dyn Tool>> + Send + Sync>;

struct Registry {
    factories: HashMap<String, RuntimeFactory>,
    tool_factory: Option<ToolFactory>,
}

impl Registry {
    fn with_defaults() -> Self {
        let mut factories: HashMap<String, RuntimeFactory> = HashMap::new();
        factories.insert(
            "local_vllm".to_string(),
            Arc::new(|config, tools| Arc::new(VllmRuntime::new(config.clone(), tools))),
        );
        factories.insert(
            "anthropic".to_string(),
            Arc::new(|config, tools| Arc::new(AnthropicRuntime::new(config.clone(), tools))),
        );
        Self {
            factories,
            tool_factory: None,
        }
    }
}

static REGISTRY: LazyLock<RwLock<Registry>> =
    LazyLock::new(|| RwLock::new(Registry::with_defaults()));

fn registry_read() -> std::sync::RwLockReadGuard<'static, Registry> {
    REGISTRY.read().unwrap_or_else(|e| e.into_inner())
}

fn registry_write() -> std::sync::RwLockWriteGuard<'static, Registry> {
    REGISTRY.write().unwrap_or_else(|e| e.into_inner())
}

/// Register (or overwrite) a runtime factory under a name.
pub fn register_runtime(name: impl Into<String>, factory: RuntimeFactory) {
    let name = name.into();
    let replaced = registry_write().factories.insert(name.clone(), factory);
    if replaced.is_some() {
        tracing::debug!(runtime = %name, "overwrote existing runtime registration");
    }
}

/// Install the tool factory used by [`create_runtime`]. Overwrites any
/// previous factory.
pub fn register_tool_factory(factory: ToolFactory) {
    registry_write().tool_factory = Some(factory);
}

/// Names of all registered runtime types, sorted.
pub fn registered_runtime_types() -> Vec<String> {
    let mut names: Vec<String> = registry_read().factories.keys().cloned().collect();
    names.sort();
    names
}

/// Build a runtime: tools first (through the tool factory), then the named
/// runtime factory. Unknown names produce a validation error enumerating the
/// registered types.
pub fn create_runtime(
    runtime_type: &str,
    runtime_config: &RuntimeConfig,
    tool_names: &[String],
    workspace_root: &Path,
    tool_config: &Map<String, Value>,
) -> Result<Arc<dyn AgentRuntime>> {
    let (factory, tools) = {
        let registry = registry_read();
        let factory = registry.factories.get(runtime_type).cloned();
        let tools = registry
            .tool_factory
            .as_ref()
            .map(|f| f(tool_names, workspace_root, tool_config))
            .unwrap_or_default();
        (factory, tools)
    };
    let factory = factory.ok_or_else(|| unknown_runtime(runtime_type))?;
    Ok(factory(runtime_config, tools))
}

/// Resolve the runtime type and merged configuration for an agent.
///
/// The `override_mode` argument (falling back to the `AGENT_RUNTIME_MODE`
/// environment variable) recognizes exactly two values: `"local"` forces
/// `local_vllm` and `"anthropic"` forces `anthropic`. Any other override
/// string is ignored, and the agent's configured runtime (default
/// `local_vllm`) is used. The named global runtime config is merged with the
/// agent's `model` override. A resolved type absent from the registry is an
/// error.
pub fn get_runtime_config(
    agent_config: &AgentModelConfig,
    global_runtime_configs: &BTreeMap<String, RuntimeConfig>,
    override_mode: Option<&str>,
) -> Result<(String, RuntimeConfig)> {
    let mode = override_mode
        .map(str::to_string)
        .or_else(|| std::env::var("AGENT_RUNTIME_MODE").ok())
        .filter(|m| !m.is_empty());

    let runtime_type = match mode.as_deref() {
        Some("local") => "local_vllm".to_string(),
        Some("anthropic") => "anthropic".to_string(),
        // Unrecognized override values fall through to the agent config.
        _ => agent_config
            .runtime
            .clone()
            .unwrap_or_else(|| "local_vllm".to_string()),
    };

    if !registry_read().factories.contains_key(&runtime_type) {
        return Err(unknown_runtime(&runtime_type));
    }

    let mut config = global_runtime_configs
        .get(&runtime_type)
        .cloned()
        .unwrap_or_default();
    if let Some(model) = &agent_config.model {
        config.model = Some(model.clone());
    }
    Ok((runtime_type, config))
}

fn unknown_runtime(requested: &str) -> Error {
    let available = registered_runtime_types();
    let available: Vec<&str> = available.iter().map(String::as_str).collect();
    Error::unknown_option("runtime type", requested, &available)
}

// ── Shared tool-loop plumbing ────────────────────────────────────────

/// Append tool documentation and the call protocol to a system prompt.
pub(crate) fn build_tool_prompt(system_prompt: &str, tools: &[Arc<dyn Tool>]) -> String {
    if tools.is_empty() {
        return system_prompt.to_string();
    }
    let mut prompt = format!("{system_prompt}\n\n# Available Tools\n\n");
    for tool in tools {
        prompt.push_str(&format!("- {}: {}\n", tool.name(), tool.description()));
    }
    prompt.push_str(
        "\nTo use a tool, respond with a JSON object in this exact format:\n\
         {\"tool_call\": {\"name\": \"tool_name\", \"parameters\": {...}}}\n\
         After tool execution the result is provided and you can continue.\n\
         When the task is complete, provide a summary without tool calls.\n",
    );
    prompt
}

/// Extract the first `{"tool_call": ...}` fragment from a response by brace
/// counting, so prose around the JSON does not break parsing.
pub(crate) fn parse_tool_call(response: &str) -> Option<ToolCall> {
    let start = response.find("{\"tool_call\"")?;
    let mut depth = 0usize;
    let mut end = None;
    for (offset, ch) in response[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    end = Some(start + offset + 1);
                    break;
                }
            }
            _ => {}
        }
    }
    let fragment = &response[start..end?];
    let parsed: Value = serde_json::from_str(fragment).ok()?;
    let call = parsed.get("tool_call")?;
    Some(ToolCall {
        name: call.get("name")?.as_str()?.to_string(),
        params: call.get("parameters").cloned().unwrap_or(Value::Null),
    })
}

/// Execute a requested tool, returning the feedback message for the model
/// and any files the tool changed.
pub(crate) async fn execute_tool(
    tools: &[Arc<dyn Tool>],
    call: &ToolCall,
) -> (String, Vec<String>) {
    let Some(tool) = tools.iter().find(|t| t.name() == call.name) else {
        return (format!("Unknown tool: {}", call.name), Vec::new());
    };
    let outcome = tool.invoke(&call.params).await;
    if outcome.success {
        (
            format!("Tool '{}' succeeded. Output: {}", call.name, outcome.output),
            outcome.files_changed,
        )
    } else {
        (
            format!(
                "Tool '{}' failed. Error: {}",
                call.name,
                outcome.error.unwrap_or_else(|| "unknown error".to_string())
            ),
            outcome.files_changed,
        )
    }
}

/// Build a reqwest client with the configured timeout.
pub(crate) fn build_http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}
