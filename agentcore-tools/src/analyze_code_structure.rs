//! Structural code analysis: extract symbols and references from a source file.

use crate::file::validate_workspace_path;
use crate::registry::Tool;
use async_trait::async_trait;
use rustant_core::ast::{AstEngine, SymbolKind};
use rustant_core::error::ToolError;
use rustant_core::types::{RiskLevel, ToolOutput};
use std::path::PathBuf;
use tracing::debug;

/// Parse a source file and report its top-level symbols (functions, types,
/// etc.) and the references it makes to other symbols.
///
/// Uses tree-sitter grammars when the corresponding `ast-*` feature is
/// compiled in, falling back to a regex-based extraction otherwise.
pub struct AnalyzeCodeStructureTool {
    workspace: PathBuf,
    engine: AstEngine,
}

impl AnalyzeCodeStructureTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self {
            workspace,
            engine: AstEngine::new(),
        }
    }
}

#[async_trait]
impl Tool for AnalyzeCodeStructureTool {
    fn name(&self) -> &str {
        "analyze_code_structure"
    }

    fn description(&self) -> &str {
        "Parse a source file and list its symbols (functions, structs, classes, etc.) \
         and the references it makes to other symbols."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the source file to analyze (relative to workspace)"
                },
                "include_references": {
                    "type": "boolean",
                    "description": "Whether to also extract cross-references. Default: false."
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let path_str = args["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments {
                name: "analyze_code_structure".into(),
                reason: "'path' parameter is required".into(),
            })?;
        let include_references = args["include_references"].as_bool().unwrap_or(false);

        let path = validate_workspace_path(&self.workspace, path_str, "analyze_code_structure")?;

        let source =
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    name: "analyze_code_structure".into(),
                    message: format!("Failed to read '{}': {}", path_str, e),
                })?;

        debug!(path = %path.display(), "Analyzing code structure");

        let symbols = self.engine.extract_symbols(&path, &source);
        let symbols_json: Vec<serde_json::Value> = symbols
            .iter()
            .map(|s| {
                serde_json::json!({
                    "name": s.name,
                    "kind": symbol_kind_str(&s.kind),
                    "start_line": s.start_line,
                    "end_line": s.end_line,
                    "signature": s.signature,
                })
            })
            .collect();

        let mut result = serde_json::json!({
            "path": path_str,
            "symbol_count": symbols.len(),
            "symbols": symbols_json,
        });

        if include_references {
            let references = self.engine.extract_references(&path, &source);
            let references_json: Vec<serde_json::Value> = references
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "from_line": r.from_line,
                        "to_name": r.to_name,
                        "kind": format!("{:?}", r.kind),
                    })
                })
                .collect();
            result["references"] = serde_json::Value::Array(references_json);
        }

        Ok(ToolOutput::text(
            serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string()),
        ))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::ReadOnly
    }
}

fn symbol_kind_str(kind: &SymbolKind) -> String {
    kind.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_analyze_rust_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("lib.rs"),
            "pub fn hello() {}\nstruct Foo {}\n",
        )
        .unwrap();

        let tool = AnalyzeCodeStructureTool::new(dir.path().to_path_buf());
        let result = tool
            .execute(serde_json::json!({"path": "lib.rs"}))
            .await
            .unwrap();

        assert!(result.content.contains("\"hello\""));
        assert!(result.content.contains("\"Foo\""));
    }

    #[tokio::test]
    async fn test_analyze_includes_references_when_requested() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "fn hello() {}\n").unwrap();

        let tool = AnalyzeCodeStructureTool::new(dir.path().to_path_buf());
        let result = tool
            .execute(serde_json::json!({"path": "lib.rs", "include_references": true}))
            .await
            .unwrap();

        assert!(result.content.contains("references"));
    }

    #[tokio::test]
    async fn test_analyze_missing_file() {
        let dir = TempDir::new().unwrap();
        let tool = AnalyzeCodeStructureTool::new(dir.path().to_path_buf());
        let result = tool
            .execute(serde_json::json!({"path": "missing.rs"}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_analyze_missing_path_argument() {
        let dir = TempDir::new().unwrap();
        let tool = AnalyzeCodeStructureTool::new(dir.path().to_path_buf());
        let result = tool.execute(serde_json::json!({})).await;
        assert!(result.is_err());
        match result.unwrap_err() {
            ToolError::InvalidArguments { name, .. } => {
                assert_eq!(name, "analyze_code_structure")
            }
            e => panic!("Expected InvalidArguments, got: {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_analyze_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let tool = AnalyzeCodeStructureTool::new(dir.path().to_path_buf());
        let result = tool
            .execute(serde_json::json!({"path": "../../etc/passwd"}))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_analyze_code_structure_properties() {
        let tool = AnalyzeCodeStructureTool::new(PathBuf::from("/tmp"));
        assert_eq!(tool.name(), "analyze_code_structure");
        assert_eq!(tool.risk_level(), RiskLevel::ReadOnly);
    }
}
