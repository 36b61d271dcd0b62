//! Core type definitions for the Rustant agent.
//!
//! Defines the fundamental data structures used throughout the system:
//! messages, tool calls, content types, and agent state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Represents a participant role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// Content within a message — text, tool call, or tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        call_id: String,
        output: String,
        is_error: bool,
    },
    MultiPart {
        parts: Vec<Content>,
    },
}

impl Content {
    /// Create a simple text content.
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }

    /// Create a tool call content.
    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Content::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Create a tool result content.
    pub fn tool_result(
        call_id: impl Into<String>,
        output: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Content::ToolResult {
            call_id: call_id.into(),
            output: output.into(),
            is_error,
        }
    }

    /// Returns the text representation of this content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A single message in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: Content,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    /// Create a new message with auto-generated ID and current timestamp.
    pub fn new(role: Role, content: Content) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, Content::text(text))
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, Content::text(text))
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Content::text(text))
    }

    /// Create a tool result message.
    pub fn tool_result(
        call_id: impl Into<String>,
        output: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::new(Role::Tool, Content::tool_result(call_id, output, is_error))
    }

    /// Add metadata to this message.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Approximate character length of the message content.
    pub fn content_length(&self) -> usize {
        match &self.content {
            Content::Text { text } => text.len(),
            Content::ToolCall {
                name, arguments, ..
            } => name.len() + arguments.to_string().len(),
            Content::ToolResult { output, .. } => output.len(),
            Content::MultiPart { parts } => parts.iter().map(content_char_len).sum(),
        }
    }
}

/// Helper to compute char length for a Content variant.
fn content_char_len(c: &Content) -> usize {
    match c {
        Content::Text { text } => text.len(),
        Content::ToolCall {
            name, arguments, ..
        } => name.len() + arguments.to_string().len(),
        Content::ToolResult { output, .. } => output.len(),
        Content::MultiPart { parts } => parts.iter().map(content_char_len).sum(),
    }
}

/// A definition describing a tool for the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The risk level of a tool operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Read-only operations (level 0).
    ReadOnly = 0,
    /// Reversible write operations (level 1).
    Write = 1,
    /// Shell command execution (level 2).
    Execute = 2,
    /// Network operations (level 3).
    Network = 3,
    /// Destructive / irreversible operations (level 4).
    Destructive = 4,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::ReadOnly => write!(f, "read-only"),
            RiskLevel::Write => write!(f, "write"),
            RiskLevel::Execute => write!(f, "execute"),
            RiskLevel::Network => write!(f, "network"),
            RiskLevel::Destructive => write!(f, "destructive"),
        }
    }
}

/// Output produced by a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolOutput {
    /// Create a simple text output.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            artifacts: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Create an error output.
    pub fn error(message: impl Into<String>) -> Self {
        let mut output = Self::text(message);
        output
            .metadata
            .insert("is_error".into(), serde_json::Value::Bool(true));
        output
    }

    /// Add an artifact to this output.
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// An artifact produced by a tool (file created, data generated, etc.).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Artifact {
    FileCreated { path: PathBuf },
    FileModified { path: PathBuf, diff: String },
    FileDeleted { path: PathBuf },
    Data { mime_type: String, data: String },
}

/// Progress update from a running tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProgressUpdate {
    /// A tool execution is at a particular stage.
    ToolProgress {
        tool: String,
        stage: String,
        /// Optional completion percentage (0.0 to 1.0).
        percent: Option<f32>,
    },
    /// A file operation is in progress.
    FileOperation {
        path: PathBuf,
        operation: String,
        bytes_processed: Option<u64>,
    },
    /// A line of shell output arrived.
    ShellOutput { line: String, is_stderr: bool },
}

/// The current state of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Planning,
    Thinking,
    Deciding,
    Executing,
    WaitingForApproval,
    WaitingForClarification,
    Complete,
    Error,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Planning => write!(f, "planning"),
            AgentStatus::Thinking => write!(f, "thinking"),
            AgentStatus::Deciding => write!(f, "deciding"),
            AgentStatus::Executing => write!(f, "executing"),
            AgentStatus::WaitingForApproval => write!(f, "waiting for approval"),
            AgentStatus::WaitingForClarification => write!(f, "waiting for clarification"),
            AgentStatus::Complete => write!(f, "complete"),
            AgentStatus::Error => write!(f, "error"),
        }
    }
}

/// Tracks the full state of the agent during task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub task_id: Option<Uuid>,
    pub status: AgentStatus,
    pub current_goal: Option<String>,
    pub iteration: usize,
    pub max_iterations: usize,
    pub checkpoints: Vec<String>,
}

impl AgentState {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            task_id: None,
            status: AgentStatus::Idle,
            current_goal: None,
            iteration: 0,
            max_iterations,
            checkpoints: Vec::new(),
        }
    }

    pub fn start_task(&mut self, goal: impl Into<String>) {
        self.task_id = Some(Uuid::new_v4());
        self.status = AgentStatus::Thinking;
        self.current_goal = Some(goal.into());
        self.iteration = 0;
        self.checkpoints.clear();
    }

    pub fn increment_iteration(&mut self) -> bool {
        self.iteration += 1;
        self.iteration <= self.max_iterations
    }

    pub fn complete(&mut self) {
        self.status = AgentStatus::Complete;
    }

    pub fn set_error(&mut self) {
        self.status = AgentStatus::Error;
    }

    pub fn reset(&mut self) {
        self.task_id = None;
        self.status = AgentStatus::Idle;
        self.current_goal = None;
        self.iteration = 0;
        self.checkpoints.clear();
    }
}

/// Token usage statistics from an LLM call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Cost tracking for LLM usage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CostEstimate {
    pub input_cost: f64,
    pub output_cost: f64,
}

impl CostEstimate {
    pub fn total(&self) -> f64 {
        self.input_cost + self.output_cost
    }

    pub fn accumulate(&mut self, other: &CostEstimate) {
        self.input_cost += other.input_cost;
        self.output_cost += other.output_cost;
    }
}

/// A stream event received during LLM response streaming.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Token(String),
    ToolCallStart {
        id: String,
        name: String,
        /// Raw provider-specific function call data (e.g., Gemini's thought_signature).
        /// Stored in message metadata to echo back in subsequent requests.
        raw_function_call: Option<serde_json::Value>,
    },
    ToolCallDelta {
        id: String,
        arguments_delta: String,
    },
    ToolCallEnd {
        id: String,
    },
    Done {
        usage: TokenUsage,
    },
    Error(String),
}

/// The result of an LLM completion request.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub message: Message,
    pub usage: TokenUsage,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// A request to the LLM for completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub stop_sequences: Vec<String>,
    pub model: Option<String>,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            tools: None,
            temperature: 0.7,
            max_tokens: None,
            stop_sequences: Vec::new(),
            model: None,
        }
    }
}
