//! # Rustant Tools
//!
//! Built-in tool implementations for the Rustant coding agent's tool catalog:
//! file operations, patching, shell execution, git query surface, AST
//! analysis, web access, todo planning, and sub-agent delegation.

pub mod analyze_code_structure;
pub mod apply_patch;
pub mod file;
pub mod finish;
pub mod git;
pub mod multi_command;
pub mod registry;
pub mod shell;
pub mod start_subagent;
pub mod todo_manager;
pub mod web;

use registry::{Tool, ToolRegistry};
use rustant_core::types::ProgressUpdate;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Register every built-in tool that needs only a workspace path.
///
/// `start_subagent` is registered separately by the caller once it has a
/// concrete `LlmProvider` and tool dispatch closure to hand it — those
/// aren't available at this call site.
pub fn register_builtin_tools(registry: &mut ToolRegistry, workspace: PathBuf) {
    register_builtin_tools_with_progress(registry, workspace, None);
}

/// Register all built-in tools, optionally with a progress channel for streaming shell output.
pub fn register_builtin_tools_with_progress(
    registry: &mut ToolRegistry,
    workspace: PathBuf,
    progress_tx: Option<mpsc::UnboundedSender<ProgressUpdate>>,
) {
    let shell_tool: Arc<dyn Tool> = if let Some(tx) = progress_tx {
        Arc::new(shell::ShellExecTool::with_progress(workspace.clone(), tx))
    } else {
        Arc::new(shell::ShellExecTool::new(workspace.clone()))
    };

    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(file::FileReadTool::new(workspace.clone())),
        Arc::new(file::FileListTool::new(workspace.clone())),
        Arc::new(file::FileSearchTool::new(workspace.clone())),
        Arc::new(file::FileWriteTool::new(workspace.clone())),
        Arc::new(file::CreateFileTool::new(workspace.clone())),
        Arc::new(apply_patch::ApplyPatchTool::new(workspace.clone())),
        shell_tool,
        Arc::new(multi_command::MultiCommandTool::new(workspace.clone())),
        Arc::new(git::GitStatusTool::new(workspace.clone())),
        Arc::new(git::GitDiffTool::new(workspace.clone())),
        Arc::new(git::GitLogTool::new(workspace.clone())),
        Arc::new(web::WebSearchTool::new()),
        Arc::new(web::UrlFetchTool::new()),
        Arc::new(analyze_code_structure::AnalyzeCodeStructureTool::new(
            workspace.clone(),
        )),
        Arc::new(todo_manager::TodoManagerTool::new()),
        Arc::new(finish::FinishTool::new()),
    ];

    for tool in tools {
        if let Err(e) = registry.register(tool) {
            tracing::warn!("Failed to register tool: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_register_all_builtin_tools() {
        let dir = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry, dir.path().to_path_buf());

        assert_eq!(registry.len(), 16);

        let names = registry.list_names();
        assert!(names.contains(&"read_file".to_string()));
        assert!(names.contains(&"find_files".to_string()));
        assert!(names.contains(&"search_in_files".to_string()));
        assert!(names.contains(&"write_file".to_string()));
        assert!(names.contains(&"create_file".to_string()));
        assert!(names.contains(&"apply_patch".to_string()));
        assert!(names.contains(&"shell_exec".to_string()));
        assert!(names.contains(&"multi_command".to_string()));
        assert!(names.contains(&"git_status".to_string()));
        assert!(names.contains(&"git_diff".to_string()));
        assert!(names.contains(&"git_log".to_string()));
        assert!(names.contains(&"web_search".to_string()));
        assert!(names.contains(&"url_fetch".to_string()));
        assert!(names.contains(&"analyze_code_structure".to_string()));
        assert!(names.contains(&"todo_manager".to_string()));
        assert!(names.contains(&"finish".to_string()));
    }

    #[test]
    fn test_tool_definitions_are_valid_json() {
        let dir = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry, dir.path().to_path_buf());

        let definitions = registry.list_definitions();
        assert_eq!(definitions.len(), 16);
        for def in &definitions {
            assert!(!def.name.is_empty(), "Tool name should not be empty");
            assert!(
                !def.description.is_empty(),
                "Tool description should not be empty"
            );
            assert!(
                def.parameters.is_object(),
                "Parameters should be a JSON object for tool '{}'",
                def.name
            );
        }
    }
}
