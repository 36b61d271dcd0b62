//! # Sub-Agent
//!
//! A scoped, inner agent spawned by the `start_subagent` tool to carry out
//! an autonomous sub-task. It carries its own conversation history and
//! observation string, mirrors the §4.7 Main Agent Loop's per-turn protocol
//! with a smaller response shape, and shares the parent's tool dispatch
//! path rather than owning one of its own.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::brain::LlmClient;
use crate::config::SubAgentConfig;
use crate::error::ToolError;
use crate::types::{Message, ToolOutput};

/// The dispatch path a sub-agent calls into — the same §4.1 contract the
/// Main Agent Loop uses, already bound to the parent's Tool Registry, Loop
/// Detector, and Safety Guardian. Wired up by the dispatcher (not this
/// module) so the sub-agent itself stays free of those dependencies.
pub type SubAgentDispatch = Arc<
    dyn Fn(&str, Value) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send>>
        + Send
        + Sync,
>;

/// A single action a sub-agent requests in one turn.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubAgentAction {
    pub tool_name: String,
    pub arguments: Value,
}

/// The structured response shape a sub-agent's LLM call must produce each
/// turn.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubAgentResponse {
    pub reasoning: String,
    pub action: SubAgentAction,
    pub completed: bool,
    pub output: Option<Value>,
    pub critical_info: Option<String>,
}

/// Why a sub-agent run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminateReason {
    Goal,
    MaxTurns,
    Timeout,
    Error,
}

/// The outcome of a completed sub-agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentResult {
    pub success: bool,
    pub output: Option<Value>,
    pub iterations: usize,
    /// Newline-joined log of preserved events: every write/shell-write
    /// operation and every tool error is auto-preserved; read-only results
    /// are preserved only when the inner agent explicitly marks them.
    pub critical_info: String,
    pub terminate_reason: TerminateReason,
    pub logs: Vec<String>,
}

const SUBAGENT_SYSTEM_PROMPT: &str = r#"You are a scoped sub-agent carrying out one focused task on behalf of a
parent agent. Each turn, respond with a single JSON object describing your
reasoning and exactly one tool action. When the task is done, call the
"finish" tool or set completed to true. Stay within the tools you have been
given access to."#;

/// Tool names whose results are always write/shell-write operations and so
/// are auto-preserved into `critical_info` regardless of the inner agent's
/// own annotation.
fn is_auto_preserved_tool(tool_name: &str) -> bool {
    matches!(
        tool_name,
        "write_file" | "apply_patch" | "create_file" | "shell_exec" | "multi_command"
    )
}

/// A scoped inner agent for autonomous sub-tasks, bounded by a turn cap and
/// a wall-clock timeout.
pub struct SubAgent {
    client: LlmClient,
    dispatch: SubAgentDispatch,
    allowed_tools: Option<HashSet<String>>,
    config: SubAgentConfig,
    history: Vec<Message>,
    observation: String,
}

impl SubAgent {
    pub fn new(
        client: LlmClient,
        dispatch: SubAgentDispatch,
        allowed_tools: Option<HashSet<String>>,
        config: SubAgentConfig,
    ) -> Self {
        Self {
            client,
            dispatch,
            allowed_tools,
            config,
            history: Vec::new(),
            observation: String::new(),
        }
    }

    /// Run the sub-agent to completion, bounded by `config.max_turns` and
    /// `config.timeout_ms`.
    pub async fn run(&mut self, task: &str) -> SubAgentResult {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        match tokio::time::timeout(timeout, self.run_turns(task)).await {
            Ok(result) => result,
            Err(_) => SubAgentResult {
                success: false,
                output: None,
                iterations: self.history.len() / 2,
                critical_info: String::new(),
                terminate_reason: TerminateReason::Timeout,
                logs: vec!["sub-agent timed out".to_string()],
            },
        }
    }

    async fn run_turns(&mut self, task: &str) -> SubAgentResult {
        let mut logs = Vec::new();
        let mut critical_lines = Vec::new();
        self.observation = format!("Task: {task}");

        for turn in 1..=self.config.max_turns {
            let schema = schemars::schema_for!(SubAgentResponse);
            let mut messages = vec![Message::system(SUBAGENT_SYSTEM_PROMPT)];
            messages.extend(self.history.clone());
            messages.push(Message::user(format!(
                "Current observation: {}",
                self.observation
            )));

            let response: Result<SubAgentResponse, _> =
                self.client.generate_object(&messages, &schema, None).await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    logs.push(format!("turn {turn}: parse error: {e}"));
                    return SubAgentResult {
                        success: false,
                        output: None,
                        iterations: turn,
                        critical_info: critical_lines.join("\n"),
                        terminate_reason: TerminateReason::Error,
                        logs,
                    };
                }
            };

            logs.push(format!("turn {turn}: {}", response.reasoning));

            if let Some(allowed) = &self.allowed_tools {
                if !allowed.contains(&response.action.tool_name) {
                    let msg = format!(
                        "tool '{}' is not in this sub-agent's allowed set",
                        response.action.tool_name
                    );
                    self.observation = msg.clone();
                    logs.push(msg);
                    self.history
                        .push(Message::assistant(serde_json::to_string(&response).unwrap_or_default()));
                    continue;
                }
            }

            if response.action.tool_name == "finish" {
                return SubAgentResult {
                    success: true,
                    output: response.output.clone(),
                    iterations: turn,
                    critical_info: critical_lines.join("\n"),
                    terminate_reason: TerminateReason::Goal,
                    logs,
                };
            }

            let result = (self.dispatch)(&response.action.tool_name, response.action.arguments.clone()).await;

            match &result {
                Ok(output) => {
                    self.observation = output.content.clone();
                    if is_auto_preserved_tool(&response.action.tool_name) {
                        critical_lines.push(format!(
                            "[{}] {}",
                            response.action.tool_name, output.content
                        ));
                    } else if let Some(marked) = &response.critical_info {
                        critical_lines.push(marked.clone());
                    }
                }
                Err(e) => {
                    self.observation = format!("Error: {e}");
                    critical_lines.push(format!("[{}] error: {e}", response.action.tool_name));
                }
            }

            self.history
                .push(Message::assistant(serde_json::to_string(&response).unwrap_or_default()));
            self.history
                .push(Message::user(format!("Observation: {}", self.observation)));

            if response.completed {
                return SubAgentResult {
                    success: result.is_ok(),
                    output: response.output.clone(),
                    iterations: turn,
                    critical_info: critical_lines.join("\n"),
                    terminate_reason: TerminateReason::Goal,
                    logs,
                };
            }
        }

        SubAgentResult {
            success: false,
            output: None,
            iterations: self.config.max_turns,
            critical_info: critical_lines.join("\n"),
            terminate_reason: TerminateReason::MaxTurns,
            logs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;

    fn dispatch_ok() -> SubAgentDispatch {
        Arc::new(|_name, _args| Box::pin(async move { Ok(ToolOutput::text("ok")) }))
    }

    fn turn_json(tool: &str, args: &str, completed: bool) -> String {
        format!(
            r#"{{"reasoning":"thinking","action":{{"tool_name":"{tool}","arguments":{args}}},"completed":{completed},"output":null,"critical_info":null}}"#
        )
    }

    #[tokio::test]
    async fn test_finish_on_first_turn_returns_goal() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::text_response(&turn_json(
            "finish", "{}", true,
        )));
        let client = LlmClient::new(provider, "sub-agent");
        let mut sub = SubAgent::new(client, dispatch_ok(), None, SubAgentConfig::default());

        let result = sub.run("do the thing").await;
        assert!(result.success);
        assert_eq!(result.iterations, 1);
        assert_eq!(result.terminate_reason, TerminateReason::Goal);
    }

    #[tokio::test]
    async fn test_timeout_returns_within_epsilon() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::text_response(&turn_json(
            "slow_tool", "{}", false,
        )));
        let client = LlmClient::new(provider, "sub-agent");
        let slow_dispatch: SubAgentDispatch = Arc::new(|_name, _args| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(ToolOutput::text("ok"))
            })
        });
        let mut config = SubAgentConfig::default();
        config.timeout_ms = 100;
        let mut sub = SubAgent::new(client, slow_dispatch, None, config);

        let start = std::time::Instant::now();
        let result = sub.run("investigate").await;
        let elapsed = start.elapsed();

        assert!(!result.success);
        assert_eq!(result.terminate_reason, TerminateReason::Timeout);
        assert!(elapsed < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_max_turns_reached() {
        let provider = Arc::new(MockLlmProvider::new());
        let mut config = SubAgentConfig::default();
        config.max_turns = 2;
        for _ in 0..config.max_turns {
            provider.queue_response(MockLlmProvider::text_response(&turn_json(
                "read_file",
                r#"{"path":"a.rs"}"#,
                false,
            )));
        }
        let client = LlmClient::new(provider, "sub-agent");
        let mut sub = SubAgent::new(client, dispatch_ok(), None, config);

        let result = sub.run("investigate").await;
        assert!(!result.success);
        assert_eq!(result.terminate_reason, TerminateReason::MaxTurns);
        assert_eq!(result.iterations, 2);
    }

    #[tokio::test]
    async fn test_disallowed_tool_is_skipped_not_executed() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::text_response(&turn_json(
            "shell_exec",
            r#"{"command":"rm -rf /"}"#,
            false,
        )));
        provider.queue_response(MockLlmProvider::text_response(&turn_json(
            "finish", "{}", true,
        )));
        let mut allowed = HashSet::new();
        allowed.insert("finish".to_string());
        let client = LlmClient::new(provider, "sub-agent");
        let mut sub = SubAgent::new(client, dispatch_ok(), Some(allowed), SubAgentConfig::default());

        let result = sub.run("careful task").await;
        assert!(result.success);
        assert_eq!(result.terminate_reason, TerminateReason::Goal);
    }

    #[tokio::test]
    async fn test_write_operation_auto_preserved_in_critical_info() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::text_response(&turn_json(
            "write_file",
            r#"{"path":"out.rs","content":"fn main(){}"}"#,
            false,
        )));
        provider.queue_response(MockLlmProvider::text_response(&turn_json(
            "finish", "{}", true,
        )));
        let dispatch: SubAgentDispatch =
            Arc::new(|_name, _args| Box::pin(async move { Ok(ToolOutput::text("wrote out.rs")) }));
        let client = LlmClient::new(provider, "sub-agent");
        let mut sub = SubAgent::new(client, dispatch, None, SubAgentConfig::default());

        let result = sub.run("write a file").await;
        assert!(result.critical_info.contains("write_file"));
        assert!(result.critical_info.contains("wrote out.rs"));
    }

    #[tokio::test]
    async fn test_tool_error_auto_preserved() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::text_response(&turn_json(
            "read_file",
            r#"{"path":"missing.rs"}"#,
            false,
        )));
        provider.queue_response(MockLlmProvider::text_response(&turn_json(
            "finish", "{}", true,
        )));
        let dispatch: SubAgentDispatch = Arc::new(|_name, _args| {
            Box::pin(async move {
                Err(ToolError::NotFound {
                    name: "missing.rs".into(),
                })
            })
        });
        let client = LlmClient::new(provider, "sub-agent");
        let mut sub = SubAgent::new(client, dispatch, None, SubAgentConfig::default());

        let result = sub.run("read a file").await;
        assert!(result.critical_info.contains("error"));
    }

    #[tokio::test]
    async fn test_parse_error_terminates_with_error_reason() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::text_response("not valid json"));
        let client = LlmClient::new(provider, "sub-agent");
        let mut sub = SubAgent::new(client, dispatch_ok(), None, SubAgentConfig::default());

        let result = sub.run("anything").await;
        assert!(!result.success);
        assert_eq!(result.terminate_reason, TerminateReason::Error);
    }
}
