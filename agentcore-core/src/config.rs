//! Configuration system for the agent runtime.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/agentcore/config.toml` and/or `.agentcore/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Top-level configuration for the agent runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    pub llm: LlmConfig,
    pub safety: SafetyConfig,
    pub context: ContextConfig,
    pub ui: UiConfig,
    pub tools: ToolsConfig,
    pub subagent: SubAgentConfig,
    pub loop_detector: LoopDetectorConfig,
    /// Optional token/cost budget configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetConfig>,
    /// External tool servers reachable over the bridge protocol.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_tools: Vec<ExternalToolServerConfig>,
    /// Configuration format version, for migration support.
    #[serde(default)]
    pub config_version: u32,
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "openai", "anthropic", "local".
    pub provider: String,
    /// Model identifier (e.g., "gpt-4o", "claude-sonnet-4-20250514").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Default temperature for generation.
    pub temperature: f32,
    /// Context window size for the model.
    pub context_window: usize,
    /// Cost per 1M input tokens (USD).
    pub input_cost_per_million: f64,
    /// Cost per 1M output tokens (USD).
    pub output_cost_per_million: f64,
    /// Whether to use streaming for LLM responses (enables token-by-token output).
    pub use_streaming: bool,
    /// Optional fallback providers tried in order if the primary fails.
    #[serde(default)]
    pub fallback_providers: Vec<FallbackProviderConfig>,
    /// Optional direct API key value, set at runtime by [`resolve_credentials`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Retry configuration for transient API errors (429, 5xx, timeouts).
    #[serde(default)]
    pub retry: RetryConfig,
    /// Optional provider rate limits for client-side throttling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limits: Option<ProviderLimits>,
}

/// Client-side rate limit configuration for a provider.
///
/// Values of 0 mean unlimited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderLimits {
    /// Input tokens per minute (0 = unlimited).
    #[serde(default)]
    pub input_tokens_per_minute: usize,
    /// Output tokens per minute (0 = unlimited).
    #[serde(default)]
    pub output_tokens_per_minute: usize,
    /// Requests per minute (0 = unlimited).
    #[serde(default)]
    pub requests_per_minute: usize,
}

/// Configuration for a fallback LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackProviderConfig {
    /// Provider name: "openai", "anthropic", etc.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            max_tokens: 4096,
            temperature: 0.7,
            context_window: 128_000,
            input_cost_per_million: 2.50,
            output_cost_per_million: 10.00,
            use_streaming: true,
            fallback_providers: Vec::new(),
            api_key: None,
            retry: RetryConfig::default(),
            rate_limits: None,
        }
    }
}

impl LlmConfig {
    /// Validate this LLM config and return any warnings.
    ///
    /// Returns an empty Vec if the config is valid. Returns human-readable
    /// warning messages for problematic values (backward compatible — does not error).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.max_tokens >= self.context_window {
            warnings.push(format!(
                "max_tokens ({}) >= context_window ({}); responses may be truncated or fail",
                self.max_tokens, self.context_window
            ));
        }
        if self.temperature < 0.0 || self.temperature > 2.0 {
            warnings.push(format!(
                "temperature ({}) is outside the typical range 0.0–2.0",
                self.temperature
            ));
        }
        warnings
    }
}

/// Retry policy for transient provider errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add random jitter to backoff delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 60000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Approval mode controlling how much autonomy the agent has.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    /// Only read operations are auto-approved; all writes require approval.
    #[default]
    Safe,
    /// All reversible operations are auto-approved; destructive requires approval.
    Cautious,
    /// Every single action requires explicit approval.
    Paranoid,
    /// All operations are auto-approved (use at own risk).
    Yolo,
}

impl std::fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalMode::Safe => write!(f, "safe"),
            ApprovalMode::Cautious => write!(f, "cautious"),
            ApprovalMode::Paranoid => write!(f, "paranoid"),
            ApprovalMode::Yolo => write!(f, "yolo"),
        }
    }
}

/// Safety and permission configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    pub approval_mode: ApprovalMode,
    /// Glob patterns for allowed file paths (relative to workspace).
    pub allowed_paths: Vec<String>,
    /// Glob patterns for denied file paths.
    pub denied_paths: Vec<String>,
    /// Allowed shell command prefixes.
    pub allowed_commands: Vec<String>,
    /// Commands that always require approval.
    pub ask_commands: Vec<String>,
    /// Commands that are never allowed.
    pub denied_commands: Vec<String>,
    /// Allowed network hosts.
    pub allowed_hosts: Vec<String>,
    /// Maximum iterations before the agent pauses.
    pub max_iterations: usize,
    /// Maximum tool calls per minute (0 = unlimited).
    #[serde(default)]
    pub max_tool_calls_per_minute: usize,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            approval_mode: ApprovalMode::Safe,
            allowed_paths: vec![
                "src/**".to_string(),
                "tests/**".to_string(),
                "docs/**".to_string(),
            ],
            denied_paths: vec![
                ".env*".to_string(),
                "**/*.key".to_string(),
                "**/secrets/**".to_string(),
                "**/*.pem".to_string(),
                "**/credentials*".to_string(),
                ".ssh/**".to_string(),
                ".aws/**".to_string(),
                "**/*id_rsa*".to_string(),
                "**/*id_ed25519*".to_string(),
            ],
            allowed_commands: vec![
                "cargo".to_string(),
                "git".to_string(),
                "npm".to_string(),
                "pnpm".to_string(),
                "yarn".to_string(),
                "python -m pytest".to_string(),
            ],
            ask_commands: vec![
                "rm".to_string(),
                "mv".to_string(),
                "cp".to_string(),
                "chmod".to_string(),
            ],
            denied_commands: vec![
                "sudo".to_string(),
                "curl | sh".to_string(),
                "wget | bash".to_string(),
            ],
            allowed_hosts: vec![
                "api.github.com".to_string(),
                "crates.io".to_string(),
                "registry.npmjs.org".to_string(),
            ],
            max_iterations: 15,
            max_tool_calls_per_minute: 0,
        }
    }
}

/// Context/token manager configuration.
///
/// Governs when the Context Manager replaces conversation history with an
/// LLM-generated structured summary (see [`crate::context`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Number of most recent messages always kept verbatim, never summarized.
    pub recent_window: usize,
    /// Fraction of the model's context window at which compression triggers (0.0 - 1.0).
    pub compression_threshold: f32,
    /// Target fraction of the context window the post-compression history should occupy.
    pub target_after_compression: f32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            recent_window: 10,
            compression_threshold: 0.8,
            target_after_compression: 0.4,
        }
    }
}

/// UI event emitter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Color theme name.
    pub theme: String,
    /// Whether to show cost information in the UI.
    pub show_cost: bool,
    /// Whether verbose output is enabled (shows tool execution details).
    #[serde(default)]
    pub verbose: bool,
    /// Capacity of the event broadcast channel (oldest events dropped under backpressure).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_event_channel_capacity() -> usize {
    1024
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: "dark".to_string(),
            show_cost: true,
            verbose: false,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Tool registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Whether to enable built-in tools.
    pub enable_builtins: bool,
    /// Default timeout for tool execution in seconds.
    pub default_timeout_secs: u64,
    /// Timeout override for execute-risk (shell) tools in seconds.
    pub execute_timeout_secs: u64,
    /// Maximum output size from a tool in bytes.
    pub max_output_bytes: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enable_builtins: true,
            default_timeout_secs: 60,
            execute_timeout_secs: 120,
            max_output_bytes: 1_048_576, // 1MB
        }
    }
}

/// Sub-agent delegation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentConfig {
    /// Maximum ReAct turns a sub-agent may take before being force-stopped.
    pub max_turns: usize,
    /// Wall-clock timeout for a sub-agent task, in milliseconds.
    pub timeout_ms: u64,
    /// Maximum nesting depth (a sub-agent may not itself spawn sub-agents past this depth).
    pub max_depth: usize,
}

impl Default for SubAgentConfig {
    fn default() -> Self {
        Self {
            max_turns: 8,
            timeout_ms: 300_000,
            max_depth: 1,
        }
    }
}

/// Loop detector thresholds, one per classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopDetectorConfig {
    /// Whether loop detection runs at all.
    pub enabled: bool,
    /// Identical tool+arguments calls in a row before flagging `exact_repeat`.
    pub exact_repeat_threshold: usize,
    /// Number of A-B-A-B repetitions before flagging `alternating_pattern`.
    pub alternating_pattern_threshold: usize,
    /// Number of same-tool calls whose arguments cycle through a small set before
    /// flagging `parameter_cycle`.
    pub parameter_cycle_threshold: usize,
    /// Sliding window size (in tool calls) examined by `tool_sequence`.
    pub tool_sequence_window: usize,
    /// Cosine-similarity threshold above which two tool calls are considered
    /// semantically equivalent by `semantic_similarity`.
    pub semantic_similarity_threshold: f32,
}

impl Default for LoopDetectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exact_repeat_threshold: 3,
            alternating_pattern_threshold: 3,
            parameter_cycle_threshold: 4,
            tool_sequence_window: 6,
            semantic_similarity_threshold: 0.92,
        }
    }
}

/// Token/cost budget configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Maximum cost in USD per session (0.0 = unlimited).
    pub session_limit_usd: f64,
    /// Maximum cost in USD per task (0.0 = unlimited).
    pub task_limit_usd: f64,
    /// Maximum total tokens per session (0 = unlimited).
    pub session_token_limit: usize,
    /// Whether to warn (false) or halt (true) when budget is exceeded.
    pub halt_on_exceed: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            session_limit_usd: 0.0,
            task_limit_usd: 0.0,
            session_token_limit: 0,
            halt_on_exceed: false,
        }
    }
}

/// An external tool server reachable via the bridge's line-delimited JSON protocol.
///
/// Mirrors [`agentcore_bridge::ExternalToolServerConfig`] at the config layer so
/// the CLI can build a bridge from a plain TOML file without depending on the
/// bridge crate's internal types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalToolServerConfig {
    /// Server name (used as a namespace prefix for its tools).
    pub name: String,
    /// Command to start the server process.
    pub command: String,
    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables to set for the server process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Whether to connect to this server on startup.
    #[serde(default = "default_true")]
    pub auto_connect: bool,
}

fn default_true() -> bool {
    true
}

/// Load configuration by layering defaults, user config, workspace config, env vars, and
/// explicit overrides (in that order, later layers taking precedence).
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&AgentConfig>,
) -> Result<AgentConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AgentConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "agentcore", "agentcore") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".agentcore").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (AGENTCORE_LLM__MODEL, AGENTCORE_SAFETY__APPROVAL_MODE, etc.)
    figment = figment.merge(Env::prefixed("AGENTCORE_").split("__"));

    // Explicit overrides (e.g. CLI flags already parsed into an AgentConfig)
    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let mut config: AgentConfig = figment.extract().map_err(Box::new)?;
    resolve_credentials(&mut config);
    Ok(config)
}

/// Resolve the LLM API key from its configured environment variable, if not already set.
///
/// `dotenvy` is expected to have been loaded by the caller (typically the CLI entry
/// point) before this runs, so `.env` files in the workspace are visible here too.
pub fn resolve_credentials(config: &mut AgentConfig) {
    if config.llm.api_key.is_none()
        && let Ok(key) = std::env::var(&config.llm.api_key_env)
        && !key.is_empty()
    {
        config.llm.api_key = Some(key);
    }
    for fallback in &mut config.llm.fallback_providers {
        let _ = fallback; // fallback keys are resolved lazily by the provider factory
    }
}

/// Check whether any agent configuration file exists (user-level or workspace-level).
///
/// Returns `true` if a config file is found at either:
/// - `~/.config/agentcore/config.toml` (user-level, via `directories` crate)
/// - `<workspace>/.agentcore/config.toml` (workspace-level)
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "agentcore", "agentcore")
        && config_dir.config_dir().join("config.toml").exists()
    {
        return true;
    }

    if let Some(ws) = workspace
        && ws.join(".agentcore").join("config.toml").exists()
    {
        return true;
    }

    false
}
