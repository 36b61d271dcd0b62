//! # Tool Registry and Dispatch
//!
//! Implements the §4.1 dispatch contract end to end: resolve, validate,
//! consult the Loop Detector, consult HITL confirmation, run under a
//! timeout, and stamp a uniform result envelope. This is the dispatch path
//! shared by a Sub-Agent's tool calls (the Main Agent Loop has its own
//! inline variant in [`crate::agent`] that additionally threads approval
//! explanations and per-tool token accounting through the same steps).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::agent::RegisteredTool;
use crate::config::ToolsConfig;
use crate::events::{EventEmitter, UiEventKind};
use crate::loop_detector::{LoopDetectionResult, LoopDetector, LoopType};
use crate::safety::{ActionRequest, ApprovalDecision, PermissionResult, SafetyGuardian};
use crate::types::RiskLevel;

/// The wire-shaped envelope every dispatched call returns, regardless of
/// success or failure.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub display_title: String,
    pub display_details: String,
    pub execution_time_ms: u64,
    pub tool_name: String,
    pub execution_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_info: Option<LoopDetectionResult>,
}

impl ToolResult {
    fn failure(tool_name: &str, execution_id: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            data: None,
            display_title: format!("{tool_name} failed"),
            display_details: error.clone(),
            error: Some(error),
            execution_time_ms: 0,
            tool_name: tool_name.to_string(),
            execution_id: execution_id.to_string(),
            loop_info: None,
        }
    }
}

/// Mediates destructive-tool confirmation. Implemented by whatever UI layer
/// is attached (TUI prompt, auto-approve policy, CI auto-deny, etc.).
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    async fn confirm(&self, action: &ActionRequest) -> ApprovalDecision;
}

/// Approves everything without prompting. Useful for sub-agents and batch
/// runs that have already been scoped to read-only or pre-approved tools.
pub struct AutoApprove;

#[async_trait]
impl ConfirmationHandler for AutoApprove {
    async fn confirm(&self, _action: &ActionRequest) -> ApprovalDecision {
        ApprovalDecision::Approve
    }
}

/// Minimal structural validator over a JSON-Schema-shaped `{type, properties,
/// required}` object. Not a full schema implementation — sufficient to
/// enforce the presence and coarse type of declared fields, which is what
/// the dispatch contract calls for.
fn validate_arguments(schema: &Value, args: &Value) -> Result<(), String> {
    let Some(schema_obj) = schema.as_object() else {
        return Ok(());
    };
    if let Some(required) = schema_obj.get("required").and_then(|r| r.as_array()) {
        let args_obj = args.as_object();
        for field in required {
            let Some(field_name) = field.as_str() else {
                continue;
            };
            let present = args_obj.map(|o| o.contains_key(field_name)).unwrap_or(false);
            if !present {
                return Err(format!("missing required field '{field_name}'"));
            }
        }
    }
    if let Some(properties) = schema_obj.get("properties").and_then(|p| p.as_object()) {
        if let Some(args_obj) = args.as_object() {
            for (key, value) in args_obj {
                let Some(expected_type) = properties
                    .get(key)
                    .and_then(|p| p.get("type"))
                    .and_then(|t| t.as_str())
                else {
                    continue;
                };
                if !json_type_matches(expected_type, value) {
                    return Err(format!(
                        "field '{key}' expected type '{expected_type}', got {value}"
                    ));
                }
            }
        }
    }
    Ok(())
}

fn json_type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// Registry of dispatchable tools, wired to the shared Loop Detector, Safety
/// Guardian, and UI Event Emitter.
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    loop_detector: LoopDetector,
    safety: SafetyGuardian,
    events: EventEmitter,
    config: ToolsConfig,
}

impl ToolRegistry {
    pub fn new(
        loop_detector: LoopDetector,
        safety: SafetyGuardian,
        events: EventEmitter,
        config: ToolsConfig,
    ) -> Self {
        Self {
            tools: HashMap::new(),
            loop_detector,
            safety,
            events,
            config,
        }
    }

    pub fn register(&mut self, tool: RegisteredTool) {
        self.tools.insert(tool.definition.name.clone(), tool);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn reset_loop_detector(&mut self) {
        self.loop_detector.reset();
    }

    /// Run the full §4.1 dispatch contract for one call.
    pub async fn dispatch(
        &mut self,
        name: &str,
        args: Value,
        execution_id: impl Into<String>,
        confirm: &dyn ConfirmationHandler,
    ) -> ToolResult {
        let execution_id = execution_id.into();
        self.events.emit(
            None,
            UiEventKind::ToolExecutionStarted {
                tool_name: name.to_string(),
            },
        );

        let result = self.dispatch_inner(name, args, &execution_id, confirm).await;

        self.events.emit(
            None,
            UiEventKind::ToolExecutionCompleted {
                tool_name: name.to_string(),
                success: result.success,
            },
        );
        result
    }

    async fn dispatch_inner(
        &mut self,
        name: &str,
        args: Value,
        execution_id: &str,
        confirm: &dyn ConfirmationHandler,
    ) -> ToolResult {
        // 1. Resolve the tool.
        if !self.tools.contains_key(name) {
            return ToolResult::failure(name, execution_id, format!("Tool not registered: {name}"));
        }

        // 2. Validate arguments against schema.
        let schema = self.tools[name].definition.parameters.clone();
        if let Err(message) = validate_arguments(&schema, &args) {
            return ToolResult::failure(name, execution_id, message);
        }

        // 3. Offer to the Loop Detector.
        let loop_result = self.loop_detector.check(name, &args);
        if loop_result.is_loop {
            warn!(tool = name, loop_type = ?loop_result.loop_type, "loop detected");
            let mut result = ToolResult::failure(name, execution_id, loop_result.description.clone());
            result.loop_info = Some(loop_result);
            return result;
        }

        // 4. HITL confirmation for anything beyond read-only.
        let risk_level = self.tools[name].risk_level;
        if risk_level != RiskLevel::ReadOnly {
            let action = SafetyGuardian::create_rich_action_request(
                name,
                risk_level,
                format!("Execute tool: {name}"),
                crate::safety::ActionDetails::Other {
                    info: args.to_string(),
                },
                crate::safety::ApprovalContext::new(),
            );
            match self.safety.check_permission(&action) {
                PermissionResult::Allowed => {}
                PermissionResult::Denied { reason } => {
                    return ToolResult::failure(name, execution_id, format!("cancelled: {reason}"));
                }
                PermissionResult::RequiresApproval { .. } => {
                    let decision = confirm.confirm(&action).await;
                    if decision == ApprovalDecision::Deny {
                        return ToolResult::failure(name, execution_id, "cancelled by user");
                    }
                    if decision == ApprovalDecision::ApproveAllSimilar {
                        self.safety.add_session_allowlist(name.to_string(), risk_level);
                    }
                }
            }
        }

        // 5. Invoke the handler under a timeout.
        let timeout = Duration::from_secs(match risk_level {
            RiskLevel::Execute => self.config.execute_timeout_secs,
            _ => self.config.default_timeout_secs,
        });
        let start = Instant::now();
        let executor_future = (self.tools[name].executor)(args);
        let outcome = tokio::time::timeout(timeout, executor_future).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        self.safety.log_execution(name, outcome.is_ok(), execution_time_ms);

        // 6/7. Wrap the outcome and stamp the envelope.
        match outcome {
            Ok(Ok(output)) => {
                info!(tool = name, duration_ms = execution_time_ms, "tool dispatch succeeded");
                ToolResult {
                    success: true,
                    data: Some(Value::String(output.content.clone())),
                    error: None,
                    display_title: format!("{name} completed"),
                    display_details: output.content,
                    execution_time_ms,
                    tool_name: name.to_string(),
                    execution_id: execution_id.to_string(),
                    loop_info: None,
                }
            }
            Ok(Err(e)) => {
                let mut result = ToolResult::failure(name, execution_id, e.to_string());
                result.execution_time_ms = execution_time_ms;
                result
            }
            Err(_) => {
                let mut result = ToolResult::failure(
                    name,
                    execution_id,
                    format!("timeout after {}ms", timeout.as_millis()),
                );
                result.execution_time_ms = execution_time_ms;
                result
            }
        }
    }
}
