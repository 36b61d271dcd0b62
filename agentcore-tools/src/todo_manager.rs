//! Exposes the Todo Plan Store to the agent as a single `todo_manager` tool.

use crate::registry::Tool;
use async_trait::async_trait;
use rustant_core::error::ToolError;
use rustant_core::todo::{TodoPriority, TodoStatus, TodoStore};
use rustant_core::types::{RiskLevel, ToolOutput};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

fn parse_priority(value: Option<&str>) -> Result<TodoPriority, ToolError> {
    match value.unwrap_or("medium") {
        "high" => Ok(TodoPriority::High),
        "medium" => Ok(TodoPriority::Medium),
        "low" => Ok(TodoPriority::Low),
        other => Err(ToolError::InvalidArguments {
            name: "todo_manager".into(),
            reason: format!("unknown priority '{}', expected high/medium/low", other),
        }),
    }
}

fn parse_status(value: &str) -> Result<TodoStatus, ToolError> {
    match value {
        "pending" => Ok(TodoStatus::Pending),
        "in_progress" => Ok(TodoStatus::InProgress),
        "completed" => Ok(TodoStatus::Completed),
        "cancelled" => Ok(TodoStatus::Cancelled),
        other => Err(ToolError::InvalidArguments {
            name: "todo_manager".into(),
            reason: format!(
                "unknown status '{}', expected pending/in_progress/completed/cancelled",
                other
            ),
        }),
    }
}

fn item_json(item: &rustant_core::todo::TodoItem) -> serde_json::Value {
    serde_json::json!({
        "id": item.id.to_string(),
        "title": item.title,
        "description": item.description,
        "priority": format!("{:?}", item.priority).to_lowercase(),
        "status": format!("{:?}", item.status),
        "estimated_effort": item.estimated_effort,
    })
}

/// Read and mutate the agent's in-memory todo plan for the current task run.
pub struct TodoManagerTool {
    store: Mutex<TodoStore>,
}

impl TodoManagerTool {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(TodoStore::new()),
        }
    }
}

impl Default for TodoManagerTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TodoManagerTool {
    fn name(&self) -> &str {
        "todo_manager"
    }

    fn description(&self) -> &str {
        "Manage the task's todo plan: create_plan, add, update_status, update_priority, \
         list, get_next, and clear."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "description": "One of: create_plan, add, update_status, update_priority, list, get_next, clear"
                },
                "id": {
                    "type": "string",
                    "description": "Todo item id, required for update_status/update_priority"
                },
                "title": { "type": "string" },
                "description": { "type": "string" },
                "priority": {
                    "type": "string",
                    "description": "high, medium, or low. Default: medium."
                },
                "status": {
                    "type": "string",
                    "description": "pending, in_progress, completed, or cancelled"
                },
                "estimated_effort": {
                    "type": "integer",
                    "description": "Effort estimate from 1 (trivial) to 10 (very large)"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let action = args["action"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments {
                name: "todo_manager".into(),
                reason: "'action' parameter is required".into(),
            })?;

        let mut store = self.store.lock().await;
        debug!(action, "todo_manager action");

        match action {
            "create_plan" => {
                store.create_plan();
                Ok(ToolOutput::text("Created a new, empty todo plan"))
            }
            "add" => {
                let title = args["title"]
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidArguments {
                        name: "todo_manager".into(),
                        reason: "'title' is required for action 'add'".into(),
                    })?;
                let description = args["description"].as_str().unwrap_or("");
                let priority = parse_priority(args["priority"].as_str())?;
                let effort = args["estimated_effort"].as_u64().unwrap_or(3) as u8;

                let id = store
                    .add_todo(title, description, priority, effort)
                    .map_err(|e| ToolError::ExecutionFailed {
                        name: "todo_manager".into(),
                        message: e.to_string(),
                    })?;

                Ok(ToolOutput::text(format!("Added todo '{}' ({})", title, id)))
            }
            "update_status" => {
                let id = parse_id(&args)?;
                let status = args["status"]
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidArguments {
                        name: "todo_manager".into(),
                        reason: "'status' is required for action 'update_status'".into(),
                    })
                    .and_then(parse_status)?;

                store
                    .update_status(id, status)
                    .map_err(|e| ToolError::ExecutionFailed {
                        name: "todo_manager".into(),
                        message: e.to_string(),
                    })?;

                Ok(ToolOutput::text(format!("Updated {} to {:?}", id, status)))
            }
            "update_priority" => {
                let id = parse_id(&args)?;
                let priority = parse_priority(args["priority"].as_str())?;

                store
                    .update_priority(id, priority)
                    .map_err(|e| ToolError::ExecutionFailed {
                        name: "todo_manager".into(),
                        message: e.to_string(),
                    })?;

                Ok(ToolOutput::text(format!(
                    "Updated {} priority to {:?}",
                    id, priority
                )))
            }
            "list" => {
                let items: Vec<serde_json::Value> =
                    store.list().iter().map(|i| item_json(i)).collect();
                Ok(ToolOutput::text(
                    serde_json::to_string_pretty(&items).unwrap_or_default(),
                ))
            }
            "get_next" => match store.get_next() {
                Some(item) => Ok(ToolOutput::text(
                    serde_json::to_string_pretty(&item_json(item)).unwrap_or_default(),
                )),
                None => Ok(ToolOutput::text("No pending todo items")),
            },
            "clear" => {
                store.clear();
                Ok(ToolOutput::text("Cleared the todo plan"))
            }
            other => Err(ToolError::InvalidArguments {
                name: "todo_manager".into(),
                reason: format!("unknown action '{}'", other),
            }),
        }
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::ReadOnly
    }
}

fn parse_id(args: &serde_json::Value) -> Result<Uuid, ToolError> {
    let raw = args["id"].as_str().ok_or_else(|| ToolError::InvalidArguments {
        name: "todo_manager".into(),
        reason: "'id' parameter is required for this action".into(),
    })?;
    Uuid::parse_str(raw).map_err(|e| ToolError::InvalidArguments {
        name: "todo_manager".into(),
        reason: format!("invalid id '{}': {}", raw, e),
    })
}
