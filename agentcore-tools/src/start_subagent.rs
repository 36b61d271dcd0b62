//! Spawns a scoped sub-agent to carry out one focused task.

use crate::registry::Tool;
use async_trait::async_trait;
use rustant_core::brain::LlmProvider;
use rustant_core::config::SubAgentConfig;
use rustant_core::error::ToolError;
use rustant_core::subagent::{SubAgent, SubAgentDispatch};
use rustant_core::types::{RiskLevel, ToolOutput};
use rustant_core::LlmClient;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Run a bounded, scoped sub-agent against the parent's own tool dispatch
/// path. The sub-agent gets its own conversation history and turn budget;
/// it cannot exceed `config.max_turns` or `config.timeout_secs`.
pub struct StartSubAgentTool {
    provider: Arc<dyn LlmProvider>,
    dispatch: SubAgentDispatch,
    config: SubAgentConfig,
}

impl StartSubAgentTool {
    pub fn new(provider: Arc<dyn LlmProvider>, dispatch: SubAgentDispatch, config: SubAgentConfig) -> Self {
        Self {
            provider,
            dispatch,
            config,
        }
    }
}

#[async_trait]
impl Tool for StartSubAgentTool {
    fn name(&self) -> &str {
        "start_subagent"
    }

    fn description(&self) -> &str {
        "Delegate a focused sub-task to a scoped inner agent with its own turn budget. \
         Use this to investigate or execute a self-contained piece of work without \
         growing the parent agent's own context."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The sub-task for the inner agent to carry out"
                },
                "allowed_tools": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Optional allow-list restricting which tools the sub-agent may call"
                }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let task = args["task"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments {
                name: "start_subagent".into(),
                reason: "'task' parameter is required".into(),
            })?;

        let allowed_tools: Option<HashSet<String>> = args["allowed_tools"].as_array().map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        });

        debug!(task, "Starting sub-agent");

        let client = LlmClient::new(self.provider.clone(), "sub-agent");
        let mut sub_agent = SubAgent::new(client, self.dispatch.clone(), allowed_tools, self.config.clone());
        let result = sub_agent.run(task).await;

        let payload = serde_json::json!({
            "success": result.success,
            "output": result.output,
            "iterations": result.iterations,
            "critical_info": result.critical_info,
            "terminate_reason": result.terminate_reason,
        });

        Ok(ToolOutput::text(
            serde_json::to_string_pretty(&payload).unwrap_or_default(),
        ))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Execute
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustant_core::brain::MockLlmProvider;
    use rustant_core::types::ToolOutput as CoreToolOutput;

    fn finish_dispatch() -> SubAgentDispatch {
        Arc::new(|_name, _args| Box::pin(async move { Ok(CoreToolOutput::text("ok")) }))
    }

    fn turn_json(tool: &str, completed: bool) -> String {
        format!(
            r#"{{"reasoning":"thinking","action":{{"tool_name":"{tool}","arguments":{{}}}},"completed":{completed},"output":null,"critical_info":null}}"#
        )
    }

    #[tokio::test]
    async fn test_start_subagent_finishes_goal() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::text_response(&turn_json("finish", true)));

        let tool = StartSubAgentTool::new(provider, finish_dispatch(), SubAgentConfig::default());
        let result = tool
            .execute(serde_json::json!({"task": "investigate the bug"}))
            .await
            .unwrap();

        assert!(result.content.contains("\"success\": true"));
        assert!(result.content.contains("goal"));
    }

    #[tokio::test]
    async fn test_start_subagent_missing_task() {
        let provider = Arc::new(MockLlmProvider::new());
        let tool = StartSubAgentTool::new(provider, finish_dispatch(), SubAgentConfig::default());
        let result = tool.execute(serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_subagent_respects_allowed_tools() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::text_response(&turn_json("shell_exec", false)));
        provider.queue_response(MockLlmProvider::text_response(&turn_json("finish", true)));

        let tool = StartSubAgentTool::new(provider, finish_dispatch(), SubAgentConfig::default());
        let result = tool
            .execute(serde_json::json!({
                "task": "careful task",
                "allowed_tools": ["finish"]
            }))
            .await
            .unwrap();

        assert!(result.content.contains("\"success\": true"));
    }

    #[test]
    fn test_start_subagent_properties() {
        let provider = Arc::new(MockLlmProvider::new());
        let tool = StartSubAgentTool::new(provider, finish_dispatch(), SubAgentConfig::default());
        assert_eq!(tool.name(), "start_subagent");
        assert_eq!(tool.risk_level(), RiskLevel::Execute);
    }
}
