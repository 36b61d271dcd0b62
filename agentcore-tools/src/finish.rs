//! Marker tool the agent calls to signal a task is complete.
//!
//! The Main Agent Loop and Sub-Agent both special-case `tool_name == "finish"`
//! before it ever reaches the dispatcher — this tool exists so `finish` still
//! appears as a normal entry in the tool catalog sent to the LLM, and so a
//! direct invocation (e.g. in tests, or tooling that lists definitions via
//! `agentcore-tools::registry::ToolRegistry`) returns something sensible.

use crate::registry::Tool;
use async_trait::async_trait;
use rustant_core::error::ToolError;
use rustant_core::types::{RiskLevel, ToolOutput};

/// Signal that the current task (or sub-agent run) is complete.
pub struct FinishTool;

impl FinishTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FinishTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FinishTool {
    fn name(&self) -> &str {
        "finish"
    }

    fn description(&self) -> &str {
        "Call this when the task is complete. Include a brief summary of what was accomplished."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "A brief summary of what was accomplished"
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let summary = args["summary"].as_str().unwrap_or("Task complete");
        Ok(ToolOutput::text(summary.to_string()))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::ReadOnly
    }
}
