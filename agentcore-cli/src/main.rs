//! Rustant CLI — minimal single-task entry point for the autonomous agent.
//!
//! Parses a task string plus workspace/config/verbosity flags, wires up the
//! tool registry and an `LlmProvider`, and runs one `Agent::process_task`
//! call to completion. No TUI, no REPL, no slash-command layer: those are
//! exactly the terminal/UI surface this crate leaves to callers.

mod callback;
mod commands;

use clap::Parser;
use rustant_core::{Agent, AgentConfig, MockLlmProvider, RegisteredTool};
use rustant_tools::register_builtin_tools;
use rustant_tools::registry::{Tool, ToolRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Rustant: an autonomous coding agent runtime.
#[derive(Parser, Debug)]
#[command(name = "rustant", version, about, long_about = None)]
struct Cli {
    /// Task to execute.
    task: Option<String>,

    /// LLM model to use (overrides config).
    #[arg(short, long)]
    model: Option<String>,

    /// Workspace directory the agent operates in.
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Path to a TOML config file layered on top of the default/workspace config.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Approval mode: safe, cautious, paranoid, yolo.
    #[arg(long)]
    approval: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output.
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand.
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug, Clone, Copy)]
enum ConfigAction {
    /// Create a default configuration file in the workspace.
    Init,
    /// Show the fully-resolved configuration.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if let Some(Commands::Config { action }) = cli.command {
        return commands::handle_config(action, &workspace).await;
    }

    let mut config = load_config_with_optional_file(&workspace, cli.config.as_deref())?;

    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    if let Some(approval) = &cli.approval {
        config.safety.approval_mode = match approval.as_str() {
            "safe" => rustant_core::ApprovalMode::Safe,
            "cautious" => rustant_core::ApprovalMode::Cautious,
            "paranoid" => rustant_core::ApprovalMode::Paranoid,
            "yolo" => rustant_core::ApprovalMode::Yolo,
            _ => {
                eprintln!("Unknown approval mode: '{}'. Using 'safe'.", approval);
                rustant_core::ApprovalMode::Safe
            }
        };
    }

    let Some(task) = cli.task else {
        eprintln!("Usage: rustant <task> [--workspace <dir>] [--model <name>]");
        eprintln!("       rustant config init|show");
        std::process::exit(2);
    };

    run_task(&task, config, workspace).await
}

/// Layer an explicit config file on top of the default/workspace-resolved config.
///
/// This crate carries no LLM client credentials of its own, so everything
/// beyond `load_config`'s defaults/workspace/env layers is this one optional
/// file, matching the "Configuration loading" ambient surface without
/// reaching into provider-specific setup.
fn load_config_with_optional_file(
    workspace: &std::path::Path,
    config_path: Option<&std::path::Path>,
) -> anyhow::Result<AgentConfig> {
    let mut config = rustant_core::config::load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    if let Some(path) = config_path {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        let overrides: AgentConfig = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file {}: {}", path.display(), e))?;
        config = overrides;
        rustant_core::config::resolve_credentials(&mut config);
    }

    Ok(config)
}

/// Run a single task to completion and exit with its success status.
async fn run_task(task: &str, config: AgentConfig, workspace: PathBuf) -> anyhow::Result<()> {
    let provider: Arc<dyn rustant_core::LlmProvider> = Arc::new(MockLlmProvider::new());
    let callback = Arc::new(callback::CliCallback::new(config.ui.verbose));
    let mut agent = Agent::new(provider, config, callback);

    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry, workspace.clone());
    register_agent_tools(&mut agent, registry);

    match agent.process_task(task).await {
        Ok(result) => {
            println!(
                "\n[{} iterations, {} tokens, ${:.4}]",
                result.iterations,
                result.total_usage.total(),
                result.total_cost.total()
            );
            if result.success {
                Ok(())
            } else {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Mirror every registered tool into the agent's internal tool table, delegating
/// execution back to the registry so there's exactly one place each tool's
/// behavior lives.
fn register_agent_tools(agent: &mut Agent, registry: ToolRegistry) {
    let registry = Arc::new(registry);
    for def in registry.list_definitions() {
        let name = def.name.clone();
        let risk_level = registry
            .get(&name)
            .map(|t| t.risk_level())
            .unwrap_or(rustant_core::RiskLevel::Execute);
        let reg = Arc::clone(&registry);
        let executor: rustant_core::agent::ToolExecutor = Box::new(move |args| {
            let reg = Arc::clone(&reg);
            let name = name.clone();
            Box::pin(async move { reg.execute(&name, args).await })
        });
        agent.register_tool(RegisteredTool {
            definition: def,
            risk_level,
            executor,
        });
    }
}
