//! Local vLLM runtime speaking the OpenAI-compatible chat API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{
    build_http_client, build_tool_prompt, execute_tool, parse_tool_call, AgentRuntime,
    RuntimeConfig, RuntimeResult, Tool,
};
use crate::error::{Error, Result};

const DEFAULT_ENDPOINT: &str = "http://localhost:8000";
const DEFAULT_MODEL: &str = "qwen2.5-coder";

/// Runtime backed by a self-hosted vLLM server.
///
/// Works fully offline against `mock://` endpoints, which short-circuit the
/// HTTP loop and return a canned successful result. Tool calls use the JSON
/// fragment protocol shared by all backends.
pub struct VllmRuntime {
    config: RuntimeConfig,
    tools: Vec<Arc<dyn Tool>>,
    http: reqwest::Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl VllmRuntime {
    pub fn new(config: RuntimeConfig, tools: Vec<Arc<dyn Tool>>) -> Self {
        let http = build_http_client(config.timeout_secs.unwrap_or(120));
        Self {
            config,
            tools,
            http,
        }
    }

    fn endpoint(&self) -> &str {
        self.config.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    fn is_mock(&self) -> bool {
        self.endpoint().starts_with("mock")
    }

    fn mock_execute(&self, user_message: &str) -> RuntimeResult {
        let preview: String = user_message.chars().take(80).collect();
        RuntimeResult {
            success: true,
            content: format!("[mock] completed: {preview}"),
            turns: 1,
            ..Default::default()
        }
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: self
                .config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            messages: messages.to_vec(),
            max_tokens: self.config.max_tokens.unwrap_or(8192),
            temperature: self.config.temperature.unwrap_or(0.7),
        };
        let url = format!("{}/v1/chat/completions", self.endpoint());
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::runtime("local_vllm", e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::runtime(
                "local_vllm",
                format!("HTTP {} from {url}", response.status()),
            ));
        }
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::runtime("local_vllm", e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::runtime("local_vllm", "empty choices in response"))
    }
}

#[async_trait]
impl AgentRuntime for VllmRuntime {
    async fn execute_task(
        &self,
        system_prompt: &str,
        user_message: &str,
        max_turns: u32,
    ) -> RuntimeResult {
        if self.is_mock() {
            return self.mock_execute(user_message);
        }

        let mut messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: build_tool_prompt(system_prompt, &self.tools),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user_message.to_string(),
            },
        ];

        let mut tool_calls = Vec::new();
        let mut files_changed = Vec::new();
        let mut last_response = String::new();

        for turn in 1..=max_turns {
            let response = match self.chat(&messages).await {
                Ok(content) => content,
                Err(e) => {
                    return RuntimeResult {
                        success: false,
                        content: last_response,
                        turns: turn,
                        tool_calls,
                        files_changed,
                        error: Some(e.to_string()),
                        ..Default::default()
                    }
                }
            };

            match parse_tool_call(&response) {
                None => {
                    return RuntimeResult {
                        success: true,
                        content: response,
                        turns: turn,
                        tool_calls,
                        files_changed,
                        ..Default::default()
                    }
                }
                Some(call) => {
                    let (result_message, changed) = execute_tool(&self.tools, &call).await;
                    tool_calls.push(call);
                    files_changed.extend(changed);
                    last_response = response.clone();
                    messages.push(ChatMessage {
                        role: "assistant".to_string(),
                        content: response,
                    });
                    messages.push(ChatMessage {
                        role: "user".to_string(),
                        content: result_message,
                    });
                }
            }
        }

        RuntimeResult {
            success: false,
            content: last_response,
            turns: max_turns,
            tool_calls,
            files_changed,
            error: Some("Maximum turns reached without task completion".to_string()),
            ..Default::default()
        }
    }

    fn runtime_type(&self) -> &'static str {
        "local_vllm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn mock_endpoint_short_circuits() {
        let runtime = VllmRuntime::new(
            RuntimeConfig {
                endpoint: Some("mock://".to_string()),
                ..Default::default()
            },
            Vec::new(),
        );
        let result = runtime
            .execute_task("you are a dev", "implement the login endpoint", 20)
            .await;
        assert!(result.success);
        assert_eq!(result.turns, 1);
        assert!(result.content.contains("implement the login endpoint"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_failure() {
        let runtime = VllmRuntime::new(
            RuntimeConfig {
                endpoint: Some("http://127.0.0.1:1".to_string()),
                timeout_secs: Some(1),
                ..Default::default()
            },
            Vec::new(),
        );
        let result = runtime.execute_task("sys", "task", 3).await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }
}
