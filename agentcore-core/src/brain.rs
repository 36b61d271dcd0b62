//! Brain module — LLM provider abstraction and interaction.
//!
//! Defines the `LlmProvider` trait for model-agnostic LLM interactions, a
//! token counter backed by `tiktoken-rs`, and `LlmClient`, the concrete
//! wrapper the agent loop talks to via `generate_text`/`generate_object`.

use crate::error::LlmError;
use crate::types::{
    CompletionRequest, CompletionResponse, Content, CostEstimate, Message, Role, StreamEvent,
    TokenUsage, ToolDefinition,
};
use async_trait::async_trait;
use schemars::schema::RootSchema;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Trait for LLM providers, supporting both full and streaming completions.
///
/// Concrete providers (Anthropic, OpenAI, local models, ...) are external
/// collaborators; this crate depends only on the trait.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Perform a streaming completion, sending events to the channel.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError>;

    /// Estimate the token count for a set of messages.
    fn estimate_tokens(&self, messages: &[Message]) -> usize;

    /// Return the context window size for this provider/model.
    fn context_window(&self) -> usize;

    /// Return whether this provider supports tool/function calling.
    fn supports_tools(&self) -> bool;

    /// Return the cost per token (input, output) in USD.
    fn cost_per_token(&self) -> (f64, f64);

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Token counter using tiktoken-rs for accurate BPE tokenization.
pub struct TokenCounter {
    bpe: tiktoken_rs::CoreBPE,
}

impl TokenCounter {
    /// Create a token counter for the given model.
    /// Falls back to cl100k_base if the model isn't recognized.
    pub fn for_model(model: &str) -> Self {
        let bpe = tiktoken_rs::get_bpe_from_model(model).unwrap_or_else(|_| {
            tiktoken_rs::cl100k_base().expect("cl100k_base should be available")
        });
        Self { bpe }
    }

    /// Count the number of tokens in a string.
    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Estimate the token count for a set of tool definitions.
    ///
    /// Each tool definition adds overhead for the JSON schema structure
    /// (type/function wrapper), plus the name, description, and parameters.
    pub fn count_tool_definitions(&self, tools: &[ToolDefinition]) -> usize {
        let mut total = 0;
        for tool in tools {
            total += 10; // struct overhead (type, function wrapper, required fields)
            total += self.count(&tool.name);
            total += self.count(&tool.description);
            total += self.count(&tool.parameters.to_string());
        }
        total
    }

    /// Estimate the token count for a set of messages.
    /// Adds overhead for message structure (role, separators).
    pub fn count_messages(&self, messages: &[Message]) -> usize {
        let mut total = 0;
        for msg in messages {
            total += 4;
            total += self.count_content(&msg.content);
        }
        total + 3 // reply priming overhead
    }

    /// Estimate the token count for a single Content value.
    fn count_content(&self, content: &Content) -> usize {
        match content {
            Content::Text { text } => self.count(text),
            Content::ToolCall {
                name, arguments, ..
            } => self.count(name) + self.count(&arguments.to_string()),
            Content::ToolResult { output, .. } => self.count(output),
            Content::MultiPart { parts } => parts.iter().map(|p| self.count_content(p)).sum(),
        }
    }
}

/// Sanitize tool_call → tool_result ordering in a message sequence.
///
/// This runs provider-agnostically *before* messages are sent to any LLM
/// provider, ensuring that:
/// 1. Every tool_result has a matching tool_call earlier in the sequence.
/// 2. No non-tool messages (system hints, summaries) appear between an
///    assistant's tool_call message and its corresponding tool_result message.
/// 3. Orphaned tool_results (no matching tool_call) are removed.
///
/// This guards against compression moving pinned tool_results out of order
/// or a system message being injected between call and result.
pub fn sanitize_tool_sequence(messages: &mut Vec<Message>) {
    // --- Pass 1: Collect all tool_call IDs from assistant messages ---
    let mut tool_call_ids: HashSet<String> = HashSet::new();
    for msg in messages.iter() {
        if msg.role != Role::Assistant {
            continue;
        }
        collect_tool_call_ids(&msg.content, &mut tool_call_ids);
    }

    // --- Pass 2: Remove orphaned tool_results (no matching tool_call) ---
    messages.retain(|msg| {
        if msg.role != Role::Tool {
            if msg.role == Role::User
                && let Content::ToolResult { call_id, .. } = &msg.content
                && !tool_call_ids.contains(call_id)
            {
                warn!(
                    call_id = call_id.as_str(),
                    "Removing orphaned tool_result (no matching tool_call)"
                );
                return false;
            }
            return true;
        }
        match &msg.content {
            Content::ToolResult { call_id, .. } => {
                if tool_call_ids.contains(call_id) {
                    true
                } else {
                    warn!(
                        call_id = call_id.as_str(),
                        "Removing orphaned tool_result (no matching tool_call)"
                    );
                    false
                }
            }
            Content::MultiPart { parts } => {
                let has_valid = parts.iter().any(|p| {
                    if let Content::ToolResult { call_id, .. } = p {
                        tool_call_ids.contains(call_id)
                    } else {
                        true
                    }
                });
                if !has_valid {
                    warn!("Removing multipart tool message with all orphaned tool_results");
                }
                has_valid
            }
            _ => true,
        }
    });

    // --- Pass 3: Relocate system messages that appear between tool_call and tool_result ---
    let mut i = 0;
    while i + 1 < messages.len() {
        let has_tool_call =
            messages[i].role == Role::Assistant && content_has_tool_call(&messages[i].content);

        if has_tool_call {
            let mut j = i + 1;
            let mut system_messages_to_relocate = Vec::new();
            while j < messages.len() && messages[j].role == Role::System {
                system_messages_to_relocate.push(j);
                j += 1;
            }
            if !system_messages_to_relocate.is_empty() {
                let mut extracted: Vec<Message> = Vec::new();
                for &idx in system_messages_to_relocate.iter().rev() {
                    extracted.push(messages.remove(idx));
                }
                extracted.reverse();
                for (offset, msg) in extracted.into_iter().enumerate() {
                    messages.insert(i + offset, msg);
                    i += 1;
                }
            }
        }
        i += 1;
    }
}

/// Extract all tool_call IDs from a Content value into the given set.
fn collect_tool_call_ids(content: &Content, ids: &mut HashSet<String>) {
    match content {
        Content::ToolCall { id, .. } => {
            ids.insert(id.clone());
        }
        Content::MultiPart { parts } => {
            for part in parts {
                collect_tool_call_ids(part, ids);
            }
        }
        _ => {}
    }
}

/// Check whether a Content value contains at least one tool_call.
fn content_has_tool_call(content: &Content) -> bool {
    match content {
        Content::ToolCall { .. } => true,
        Content::MultiPart { parts } => parts.iter().any(content_has_tool_call),
        _ => false,
    }
}

/// `Brain` wraps an LLM provider and adds higher-level logic: prompt
/// construction, cost tracking, and retry.
pub struct Brain {
    provider: Arc<dyn LlmProvider>,
    system_prompt: String,
    total_usage: TokenUsage,
    total_cost: CostEstimate,
    token_counter: TokenCounter,
}

impl Brain {
    pub fn new(provider: Arc<dyn LlmProvider>, system_prompt: impl Into<String>) -> Self {
        let model_name = provider.model_name().to_string();
        Self {
            provider,
            system_prompt: system_prompt.into(),
            total_usage: TokenUsage::default(),
            total_cost: CostEstimate::default(),
            token_counter: TokenCounter::for_model(&model_name),
        }
    }

    /// Estimate token count for messages using tiktoken-rs.
    pub fn estimate_tokens(&self, messages: &[Message]) -> usize {
        self.token_counter.count_messages(messages)
    }

    /// Estimate token count for messages plus tool definitions.
    pub fn estimate_tokens_with_tools(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> usize {
        let mut total = self.token_counter.count_messages(messages);
        if let Some(tool_defs) = tools {
            total += self.token_counter.count_tool_definitions(tool_defs);
        }
        total
    }

    /// Construct messages for the LLM with system prompt prepended.
    ///
    /// After assembly, [`sanitize_tool_sequence`] runs to ensure tool_call →
    /// tool_result ordering is never broken regardless of compression or
    /// system message injection.
    pub fn build_messages(&self, conversation: &[Message]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(Message::system(&self.system_prompt));
        messages.extend_from_slice(conversation);
        sanitize_tool_sequence(&mut messages);
        messages
    }

    /// Send a completion request and return the response, tracking usage.
    pub async fn think(
        &mut self,
        conversation: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<CompletionResponse, LlmError> {
        let messages = self.build_messages(conversation);
        let mut token_estimate = self.provider.estimate_tokens(&messages);
        if let Some(ref tool_defs) = tools {
            token_estimate += self.token_counter.count_tool_definitions(tool_defs);
        }
        let context_limit = self.provider.context_window();

        if token_estimate > context_limit {
            return Err(LlmError::ContextOverflow {
                used: token_estimate,
                limit: context_limit,
            });
        }

        debug!(
            model = self.provider.model_name(),
            estimated_tokens = token_estimate,
            "Sending completion request"
        );

        let request = CompletionRequest {
            messages,
            tools,
            temperature: 0.7,
            max_tokens: None,
            stop_sequences: Vec::new(),
            model: None,
        };

        let response = self.provider.complete(request).await?;
        self.track_usage(&response.usage);

        info!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            cost = format!("${:.4}", self.total_cost.total()),
            "Completion received"
        );

        Ok(response)
    }

    /// Send a completion request with retry logic and exponential backoff.
    ///
    /// Retries on transient errors (RateLimited, Timeout, Connection) up to
    /// `max_retries` times with exponential backoff (1s, 2s, 4s, ..., capped
    /// at 32s). Non-transient errors are returned immediately.
    pub async fn think_with_retry(
        &mut self,
        conversation: &[Message],
        tools: Option<Vec<ToolDefinition>>,
        max_retries: usize,
    ) -> Result<CompletionResponse, LlmError> {
        let mut last_error = None;

        for attempt in 0..=max_retries {
            match self.think(conversation, tools.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if Self::is_retryable(&e) => {
                    if attempt < max_retries {
                        let backoff_secs = std::cmp::min(1u64 << attempt, 32);
                        let wait = match &e {
                            LlmError::RateLimited { retry_after_secs } => {
                                std::cmp::max(*retry_after_secs, backoff_secs)
                            }
                            _ => backoff_secs,
                        };
                        info!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_secs = wait,
                            error = %e,
                            "Retrying after transient error"
                        );
                        tokio::time::sleep(std::time::Duration::from_secs(wait)).await;
                        last_error = Some(e);
                    } else {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(LlmError::Connection {
            message: "Max retries exceeded".to_string(),
        }))
    }

    /// Check if an LLM error is transient and should be retried.
    pub fn is_retryable(error: &LlmError) -> bool {
        matches!(
            error,
            LlmError::RateLimited { .. } | LlmError::Timeout { .. } | LlmError::Connection { .. }
        )
    }

    /// Send a streaming completion request, returning events via channel.
    pub async fn think_streaming(
        &mut self,
        conversation: &[Message],
        tools: Option<Vec<ToolDefinition>>,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        let messages = self.build_messages(conversation);
        let request = CompletionRequest {
            messages,
            tools,
            temperature: 0.7,
            max_tokens: None,
            stop_sequences: Vec::new(),
            model: None,
        };
        self.provider.complete_streaming(request, tx).await
    }

    /// Get total token usage across all calls.
    pub fn total_usage(&self) -> &TokenUsage {
        &self.total_usage
    }

    /// Get total cost across all calls.
    pub fn total_cost(&self) -> &CostEstimate {
        &self.total_cost
    }

    /// Get the model name.
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Get the context window size.
    pub fn context_window(&self) -> usize {
        self.provider.context_window()
    }

    /// Get cost rates (input_per_token, output_per_token) from the provider.
    pub fn provider_cost_rates(&self) -> (f64, f64) {
        self.provider.cost_per_token()
    }

    /// Get a reference to the underlying LLM provider.
    pub fn provider(&self) -> &dyn LlmProvider {
        &*self.provider
    }

    /// Get a cloneable Arc handle to the underlying LLM provider.
    pub fn provider_arc(&self) -> Arc<dyn LlmProvider> {
        Arc::clone(&self.provider)
    }

    /// Track usage and cost from an external completion (e.g., streaming).
    pub fn track_usage(&mut self, usage: &TokenUsage) {
        self.total_usage.accumulate(usage);
        let (input_rate, output_rate) = self.provider.cost_per_token();
        let cost = CostEstimate {
            input_cost: usage.input_tokens as f64 * input_rate,
            output_cost: usage.output_tokens as f64 * output_rate,
        };
        self.total_cost.accumulate(&cost);
    }

    /// Get the current token usage as a fraction of the context window.
    pub fn context_usage_ratio(&self, conversation: &[Message]) -> f32 {
        let messages = self.build_messages(conversation);
        let tokens = self.provider.estimate_tokens(&messages);
        tokens as f32 / self.provider.context_window() as f32
    }
}

/// The concrete surface the agent loop, planner, and sub-agents talk to.
///
/// Wraps a [`Brain`] and exposes exactly the two operations the rest of the
/// core depends on: free-text generation and schema-validated structured
/// generation. Keeping this as a concrete struct (rather than widening
/// `LlmProvider`) lets `generate_object` be generic over the caller's target
/// type while `LlmProvider` itself stays trait-object safe.
pub struct LlmClient {
    brain: Brain,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn LlmProvider>, system_prompt: impl Into<String>) -> Self {
        Self {
            brain: Brain::new(provider, system_prompt),
        }
    }

    pub fn brain(&self) -> &Brain {
        &self.brain
    }

    pub fn brain_mut(&mut self) -> &mut Brain {
        &mut self.brain
    }

    /// Generate free-form text from a system prompt and user prompt.
    pub async fn generate_text(
        &mut self,
        system: &str,
        prompt: &str,
        tools: Option<Vec<ToolDefinition>>,
        max_tokens: Option<u32>,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let conversation = vec![Message::user(prompt)];
        let mut messages = Vec::with_capacity(2);
        messages.push(Message::system(system));
        messages.extend(conversation);
        sanitize_tool_sequence(&mut messages);

        let request = CompletionRequest {
            messages,
            tools,
            temperature,
            max_tokens,
            stop_sequences: Vec::new(),
            model: None,
        };
        let response = self.brain.provider.complete(request).await?;
        self.brain.track_usage(&response.usage);
        Ok(response
            .message
            .content
            .as_text()
            .map(str::to_string)
            .unwrap_or_default())
    }

    /// Generate a schema-validated object of type `T` from a message history.
    ///
    /// `schema` describes the expected JSON shape; `allow_tools` additionally
    /// offers the given tools during generation (for planners/responders that
    /// may also want to call a tool instead of returning a final object).
    /// Returns a parse error if the provider's response doesn't validate
    /// against `T`.
    pub async fn generate_object<T: DeserializeOwned>(
        &mut self,
        messages: &[Message],
        schema: &RootSchema,
        allow_tools: Option<Vec<ToolDefinition>>,
    ) -> Result<T, LlmError> {
        let _ = schema; // schema is forwarded to providers that accept one natively
        let response = self.brain.think(messages, allow_tools).await?;
        let text = response.message.content.as_text().ok_or_else(|| {
            LlmError::ResponseParse {
                message: "expected a text response carrying a JSON object".into(),
            }
        })?;
        serde_json::from_str(text).map_err(|e| LlmError::ResponseParse {
            message: format!("response did not match expected schema: {e}"),
        })
    }
}

/// A mock LLM provider for testing and development.
pub struct MockLlmProvider {
    model: String,
    context_window: usize,
    responses: std::sync::Mutex<Vec<CompletionResponse>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            context_window: 128_000,
            responses: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create a MockLlmProvider that always returns the given text.
    ///
    /// Queues multiple copies of the response so it can handle multiple calls.
    pub fn with_response(text: &str) -> Self {
        let provider = Self::new();
        for _ in 0..20 {
            provider.queue_response(Self::text_response(text));
        }
        provider
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.responses.lock().unwrap().push(response);
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    /// Create a tool call response for testing.
    pub fn tool_call_response(tool_name: &str, arguments: serde_json::Value) -> CompletionResponse {
        let call_id = format!("call_{}", uuid::Uuid::new_v4());
        CompletionResponse {
            message: Message::new(
                Role::Assistant,
                Content::tool_call(&call_id, tool_name, arguments),
            ),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 30,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("tool_calls".to_string()),
        }
    }

    /// Create a multipart response (text + tool call) for testing.
    pub fn multipart_response(
        text: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> CompletionResponse {
        let call_id = format!("call_{}", uuid::Uuid::new_v4());
        CompletionResponse {
            message: Message::new(
                Role::Assistant,
                Content::MultiPart {
                    parts: vec![
                        Content::text(text),
                        Content::tool_call(&call_id, tool_name, arguments),
                    ],
                },
            ),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("tool_calls".to_string()),
        }
    }
}

/// Rough token estimate for mock provider (~4 chars per token).
fn estimate_content_tokens_mock(content: &Content) -> usize {
    match content {
        Content::Text { text } => text.len() / 4,
        Content::ToolCall { arguments, .. } => arguments.to_string().len() / 4,
        Content::ToolResult { output, .. } => output.len() / 4,
        Content::MultiPart { parts } => parts.iter().map(estimate_content_tokens_mock).sum(),
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(MockLlmProvider::text_response(
                "I'm a mock LLM. No queued responses available.",
            ))
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        let response = self.complete(request).await?;
        if let Some(text) = response.message.content.as_text() {
            for word in text.split_whitespace() {
                let _ = tx.send(StreamEvent::Token(format!("{} ", word))).await;
            }
        }
        let _ = tx
            .send(StreamEvent::Done {
                usage: response.usage,
            })
            .await;
        Ok(())
    }

    fn estimate_tokens(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| estimate_content_tokens_mock(&m.content))
            .sum::<usize>()
            + 100 // overhead for message structure
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn cost_per_token(&self) -> (f64, f64) {
        (0.0, 0.0) // free for mock
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// The default system prompt for the agent loop.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an autonomous coding agent. You accomplish software engineering tasks by reasoning about the user's goal and dispatching tool calls, one ReAct iteration at a time.

Rules:
- Always read a file before modifying it.
- Prefer small, focused changes over large rewrites.
- Respect the workspace boundary and the tool registry's permission decisions; never attempt to bypass a denial.
- If a tool call fails, reconsider your approach before retrying — do not repeat the exact same call.
- Use todo_manager to track multi-step plans; keep it updated as steps complete.
- When you have nothing further to do, finish with a clear summary of what was accomplished."#;

// ---------------------------------------------------------------------------
// Token Budget Manager
// ---------------------------------------------------------------------------

/// Tracks token usage against configurable budgets and predicts costs
/// before execution. Can warn or halt when budgets are exceeded.
pub struct TokenBudgetManager {
    session_limit_usd: f64,
    task_limit_usd: f64,
    session_token_limit: usize,
    halt_on_exceed: bool,
    session_cost: f64,
    task_cost: f64,
    session_tokens: usize,
}

/// The result of a pre-call budget check.
#[derive(Debug, Clone, PartialEq)]
pub enum BudgetCheckResult {
    /// Budget is within limits, proceed.
    Ok,
    /// Budget warning — approaching limit but not exceeded.
    Warning { message: String, usage_pct: f64 },
    /// Budget exceeded — should halt if configured.
    Exceeded { message: String },
}

impl TokenBudgetManager {
    /// Create a new budget manager from config. Passing `None` creates
    /// an unlimited manager that always returns `Ok`.
    pub fn new(config: Option<&crate::config::BudgetConfig>) -> Self {
        match config {
            Some(cfg) => Self {
                session_limit_usd: cfg.session_limit_usd,
                task_limit_usd: cfg.task_limit_usd,
                session_token_limit: cfg.session_token_limit,
                halt_on_exceed: cfg.halt_on_exceed,
                session_cost: 0.0,
                task_cost: 0.0,
                session_tokens: 0,
            },
            None => Self {
                session_limit_usd: 0.0,
                task_limit_usd: 0.0,
                session_token_limit: 0,
                halt_on_exceed: false,
                session_cost: 0.0,
                task_cost: 0.0,
                session_tokens: 0,
            },
        }
    }

    /// Reset task-level tracking (call at start of each new task).
    pub fn reset_task(&mut self) {
        self.task_cost = 0.0;
    }

    /// Record usage after an LLM call completes.
    pub fn record_usage(&mut self, usage: &TokenUsage, cost: &CostEstimate) {
        self.session_cost += cost.total();
        self.task_cost += cost.total();
        self.session_tokens += usage.total();
    }

    /// Estimate cost for an upcoming LLM call and check against budgets.
    ///
    /// `estimated_input_tokens` is the count of tokens in the request.
    /// `input_rate` and `output_rate` are the per-token costs from the
    /// provider. Output tokens are estimated at 0.5x input as a heuristic.
    pub fn check_budget(
        &self,
        estimated_input_tokens: usize,
        input_rate: f64,
        output_rate: f64,
    ) -> BudgetCheckResult {
        let predicted_output = estimated_input_tokens / 2;
        let predicted_cost =
            (estimated_input_tokens as f64 * input_rate) + (predicted_output as f64 * output_rate);

        let projected_session_cost = self.session_cost + predicted_cost;
        let projected_task_cost = self.task_cost + predicted_cost;
        let projected_session_tokens =
            self.session_tokens + estimated_input_tokens + predicted_output;

        if self.session_limit_usd > 0.0 && projected_session_cost > self.session_limit_usd {
            return BudgetCheckResult::Exceeded {
                message: format!(
                    "Session cost ${:.4} would exceed limit ${:.4}",
                    projected_session_cost, self.session_limit_usd
                ),
            };
        }

        if self.task_limit_usd > 0.0 && projected_task_cost > self.task_limit_usd {
            return BudgetCheckResult::Exceeded {
                message: format!(
                    "Task cost ${:.4} would exceed limit ${:.4}",
                    projected_task_cost, self.task_limit_usd
                ),
            };
        }

        if self.session_token_limit > 0 && projected_session_tokens > self.session_token_limit {
            return BudgetCheckResult::Exceeded {
                message: format!(
                    "Session tokens {} would exceed limit {}",
                    projected_session_tokens, self.session_token_limit
                ),
            };
        }

        if self.session_limit_usd > 0.0 {
            let pct = projected_session_cost / self.session_limit_usd;
            if pct > 0.8 {
                return BudgetCheckResult::Warning {
                    message: format!(
                        "Session cost at {:.0}% of ${:.4} limit",
                        pct * 100.0,
                        self.session_limit_usd
                    ),
                    usage_pct: pct,
                };
            }
        }

        BudgetCheckResult::Ok
    }

    /// Whether budget enforcement should halt execution on exceed.
    pub fn should_halt_on_exceed(&self) -> bool {
        self.halt_on_exceed
    }

    /// Current session cost.
    pub fn session_cost(&self) -> f64 {
        self.session_cost
    }

    /// Current task cost.
    pub fn task_cost(&self) -> f64 {
        self.task_cost
    }

    /// Current session token count.
    pub fn session_tokens(&self) -> usize {
        self.session_tokens
    }
}
