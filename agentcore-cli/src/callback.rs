//! A CLI callback that prints to stdout and reads approval from stdin.
//!
//! When `verbose` is false (the default), tool execution details, status
//! changes, and usage updates are hidden for cleaner output.

use rustant_core::explanation::DecisionExplanation;
use rustant_core::safety::{ActionRequest, ApprovalDecision};
use rustant_core::types::{AgentStatus, CostEstimate, TokenUsage, ToolOutput};
use rustant_core::{AgentCallback, BudgetSeverity};
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};

/// Truncate a string to at most `max_chars` characters, respecting UTF-8 boundaries.
fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub(crate) struct CliCallback {
    verbose: AtomicBool,
}

impl CliCallback {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose: AtomicBool::new(verbose),
        }
    }

    fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl AgentCallback for CliCallback {
    async fn on_assistant_message(&self, message: &str) {
        println!("\n\x1b[32mRustant:\x1b[0m {}", message);
    }

    async fn on_token(&self, token: &str) {
        print!("{}", token);
        let _ = io::stdout().flush();
    }

    async fn request_approval(&self, action: &ActionRequest) -> ApprovalDecision {
        println!(
            "\n\x1b[33m[Approval Required]\x1b[0m {} (risk: {})",
            action.description, action.risk_level
        );
        if let Some(ref reasoning) = action.approval_context.reasoning {
            println!("  \x1b[90mReason:\x1b[0m {}", reasoning);
        }
        for consequence in &action.approval_context.consequences {
            println!("  \x1b[90mConsequence:\x1b[0m {}", consequence);
        }

        print!("  [y]es / [n]o / [a]pprove all similar > ");
        let _ = io::stdout().flush();

        let stdin = io::stdin();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_ok() {
            match line.trim().to_lowercase().as_str() {
                "y" | "yes" => ApprovalDecision::Approve,
                "a" | "all" => ApprovalDecision::ApproveAllSimilar,
                _ => ApprovalDecision::Deny,
            }
        } else {
            ApprovalDecision::Deny
        }
    }

    async fn on_tool_start(&self, tool_name: &str, args: &serde_json::Value) {
        if !self.is_verbose() {
            return;
        }
        println!("\x1b[36m  [{}] executing with {}...\x1b[0m", tool_name, args);
    }

    async fn on_tool_result(&self, tool_name: &str, output: &ToolOutput, duration_ms: u64) {
        if !self.is_verbose() {
            return;
        }
        let preview = if output.content.chars().count() > 200 {
            format!("{}...", truncate_str(&output.content, 200))
        } else {
            output.content.clone()
        };
        println!(
            "\x1b[36m  [{}] completed in {}ms\x1b[0m\n  {}",
            tool_name, duration_ms, preview
        );
    }

    async fn on_status_change(&self, status: AgentStatus) {
        if !self.is_verbose() {
            return;
        }
        match status {
            AgentStatus::Thinking => print!("\x1b[90m  thinking...\x1b[0m"),
            AgentStatus::Complete => println!("\x1b[90m  done.\x1b[0m"),
            _ => {}
        }
        let _ = io::stdout().flush();
    }

    async fn on_usage_update(&self, usage: &TokenUsage, cost: &CostEstimate) {
        if !self.is_verbose() {
            return;
        }
        print!(
            "\r\x1b[90m  [tokens: {}/{} | cost: ${:.4}]\x1b[0m",
            usage.input_tokens,
            usage.output_tokens,
            cost.total()
        );
        let _ = io::stdout().flush();
    }

    async fn on_decision_explanation(&self, explanation: &DecisionExplanation) {
        if !self.is_verbose() {
            return;
        }
        print!(
            "\n\x1b[90m  [confidence: {:.0}%",
            explanation.confidence * 100.0
        );
        if !explanation.reasoning_chain.is_empty() {
            print!(" | {}", explanation.reasoning_chain[0].description);
        }
        println!("]\x1b[0m");
    }

    async fn on_budget_warning(&self, message: &str, severity: BudgetSeverity) {
        match severity {
            BudgetSeverity::Warning => println!("\x1b[33m  [Budget Warning] {}\x1b[0m", message),
            BudgetSeverity::Exceeded => println!("\x1b[31m  [Budget Exceeded] {}\x1b[0m", message),
        }
    }

    async fn on_clarification_request(&self, question: &str) -> String {
        println!("\n\x1b[33m?\x1b[0m {}", question);
        print!("\x1b[1;34m> \x1b[0m");
        let _ = io::stdout().flush();

        let stdin = io::stdin();
        let mut answer = String::new();
        if stdin.lock().read_line(&mut answer).is_ok() {
            answer.trim().to_string()
        } else {
            String::new()
        }
    }
}
