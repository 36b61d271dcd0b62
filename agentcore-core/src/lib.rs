//! # agentcore-core
//!
//! Core library for the agentcore autonomous coding agent. Provides the
//! ReAct agent orchestrator, LLM interface (brain), context/token manager,
//! safety guardian, configuration, and fundamental types.
//!
//! This crate is deliberately silent on concrete tool implementations, LLM
//! provider credentials, and UI/CLI parsing — those live in
//! `agentcore-tools`, `agentcore-bridge`, and `agentcore-cli` respectively.

pub mod agent;
pub mod ast;
pub mod brain;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod explanation;
pub mod loop_detector;
pub mod planner;
pub mod safety;
pub mod subagent;
pub mod todo;
pub mod types;

// Re-export commonly used types at the crate root.
pub use agent::{
    Agent, AgentCallback, AgentMessage, BudgetSeverity, ContextHealthEvent, NoOpCallback,
    RecordingCallback, RegisteredTool, TaskResult, ToolExecutor,
};
pub use ast::{AstEngine, Reference, ReferenceKind, Symbol, SymbolKind};
pub use brain::{
    Brain, BudgetCheckResult, DEFAULT_SYSTEM_PROMPT, LlmClient, LlmProvider, MockLlmProvider,
    TokenBudgetManager, TokenCounter, sanitize_tool_sequence,
};
pub use config::{
    AgentConfig, ApprovalMode, BudgetConfig, ContextConfig, ExternalToolServerConfig,
    LlmConfig, LoopDetectorConfig, RetryConfig, SafetyConfig, SubAgentConfig, ToolsConfig,
    UiConfig, config_exists, load_config,
};
pub use context::{
    CompressionDecision, CompressionOutcome, CompressionResult, CompressionSummary,
    ContextBreakdown, ContextManager, ContextQuality, ContextSummarizer, SummarizeError,
    TokenAlert, TokenCostDisplay, smart_fallback_summary,
};
pub use dispatch::{AutoApprove, ConfirmationHandler, ToolRegistry, ToolResult};
pub use error::{
    AgentCoreError, AgentError, ConfigError, LlmError, MemoryError, Result, SafetyError, ToolError,
};
pub use events::{EventEmitter, UiEvent, UiEventKind};
pub use explanation::{
    AlternativeAction, ContextFactor, DecisionExplanation, DecisionType, ExplanationBuilder,
    FactorInfluence, ReasoningStep,
};
pub use loop_detector::{LoopDetectionResult, LoopDetector, LoopType};
pub use planner::{PlannedTodo, Planner, PlanningResponse};
pub use safety::{
    ActionDetails, ActionRequest, ApprovalContext, ApprovalDecision, AuditEntry, AuditEvent,
    PermissionResult, ReversibilityInfo, SafetyGuardian,
};
pub use subagent::{
    SubAgent, SubAgentAction, SubAgentDispatch, SubAgentResponse, SubAgentResult, TerminateReason,
};
pub use tokio_util::sync::CancellationToken;
pub use todo::{TodoError, TodoItem, TodoPriority, TodoStatus, TodoStore};
pub use types::{
    AgentState, AgentStatus, Artifact, CompletionRequest, CompletionResponse, Content,
    CostEstimate, Message, ProgressUpdate, RiskLevel, Role, StreamEvent, TokenUsage,
    ToolDefinition, ToolOutput,
};
