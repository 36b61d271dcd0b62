//! Unified-diff patch application.
//!
//! Tries the system `patch` binary first (it already handles fuzzy offsets
//! and whitespace-only hunks better than a hand-rolled applier); falls back
//! to a manual hunk-by-hunk application when `patch` is unavailable or
//! rejects the diff. A rejected hunk fails the whole call — there is no
//! partial application.

use crate::registry::Tool;
use async_trait::async_trait;
use rustant_core::error::ToolError;
use rustant_core::types::{Artifact, RiskLevel, ToolOutput};
use std::path::PathBuf;
use tracing::debug;

/// One `@@ -oldStart,oldCount +newStart,newCount @@` hunk and its body lines.
struct Hunk {
    old_start: usize,
    old_count: usize,
    new_start: usize,
    new_count: usize,
    lines: Vec<(char, String)>,
}

fn parse_hunk_header(line: &str) -> Option<(usize, usize, usize, usize)> {
    let inner = line.strip_prefix("@@ ")?.split(" @@").next()?;
    let mut parts = inner.split_whitespace();
    let old = parts.next()?.strip_prefix('-')?;
    let new = parts.next()?.strip_prefix('+')?;

    let parse_range = |s: &str| -> Option<(usize, usize)> {
        let mut it = s.split(',');
        let start: usize = it.next()?.parse().ok()?;
        let count: usize = it.next().map(|c| c.parse().ok()).unwrap_or(Some(1))?;
        Some((start, count))
    };

    let (old_start, old_count) = parse_range(old)?;
    let (new_start, new_count) = parse_range(new)?;
    Some((old_start, old_count, new_start, new_count))
}

fn parse_hunks(diff: &str) -> Result<Vec<Hunk>, String> {
    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;

    for line in diff.lines() {
        if let Some((old_start, old_count, new_start, new_count)) = parse_hunk_header(line) {
            if let Some(h) = current.take() {
                hunks.push(h);
            }
            current = Some(Hunk {
                old_start,
                old_count,
                new_start,
                new_count,
                lines: Vec::new(),
            });
            continue;
        }
        if let Some(h) = current.as_mut() {
            if let Some(rest) = line.strip_prefix('+') {
                h.lines.push(('+', rest.to_string()));
            } else if let Some(rest) = line.strip_prefix('-') {
                h.lines.push(('-', rest.to_string()));
            } else if let Some(rest) = line.strip_prefix(' ') {
                h.lines.push((' ', rest.to_string()));
            } else if line.is_empty() {
                h.lines.push((' ', String::new()));
            }
            // lines like "\ No newline at end of file" are ignored
        }
    }
    if let Some(h) = current.take() {
        hunks.push(h);
    }

    if hunks.is_empty() {
        return Err("no hunks found in patch".to_string());
    }
    Ok(hunks)
}

/// Detect the dominant line ending of `text`: `"\r\n"` if any CRLF is
/// present, else `"\n"`.
fn detect_line_ending(text: &str) -> &'static str {
    if text.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

fn apply_hunks(original: &str, hunks: &[Hunk]) -> Result<String, String> {
    let line_ending = detect_line_ending(original);
    let lines: Vec<&str> = original.lines().collect();
    let mut result: Vec<String> = Vec::new();
    let mut cursor = 0usize; // 0-based index into `lines` already copied through

    for hunk in hunks {
        let hunk_start = hunk.old_start.saturating_sub(1);
        if hunk_start < cursor || hunk_start > lines.len() {
            return Err(format!(
                "hunk out of order or out of range at line {}",
                hunk.old_start
            ));
        }
        // Copy unmodified lines before the hunk.
        for line in &lines[cursor..hunk_start] {
            result.push(line.to_string());
        }
        let mut pos = hunk_start;
        for (tag, text) in &hunk.lines {
            match tag {
                ' ' => {
                    if pos >= lines.len() || lines[pos] != text {
                        return Err(format!("context mismatch at line {}", pos + 1));
                    }
                    result.push(text.clone());
                    pos += 1;
                }
                '-' => {
                    if pos >= lines.len() || lines[pos] != text {
                        return Err(format!("context mismatch at line {}", pos + 1));
                    }
                    pos += 1;
                }
                '+' => {
                    result.push(text.clone());
                }
                _ => unreachable!(),
            }
        }
        cursor = pos;
        let _ = (hunk.old_count, hunk.new_start, hunk.new_count);
    }
    for line in &lines[cursor..] {
        result.push(line.to_string());
    }

    let mut out = result.join(line_ending);
    if original.ends_with('\n') || original.ends_with("\r\n") {
        out.push_str(line_ending);
    }
    Ok(out)
}

/// Apply a unified diff to a file in the workspace.
pub struct ApplyPatchTool {
    workspace: PathBuf,
}

impl ApplyPatchTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }

    async fn try_system_patch(&self, path: &std::path::Path, diff: &str) -> Option<String> {
        use tokio::io::AsyncWriteExt;

        let mut child = tokio::process::Command::new("patch")
            .arg(path)
            .arg("--no-backup-if-mismatch")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .current_dir(&self.workspace)
            .spawn()
            .ok()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(diff.as_bytes()).await.ok()?;
        }
        let output = child.wait_with_output().await.ok()?;
        if output.status.success() {
            Some(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            None
        }
    }
}

#[async_trait]
impl Tool for ApplyPatchTool {
    fn name(&self) -> &str {
        "apply_patch"
    }

    fn description(&self) -> &str {
        "Apply a unified diff patch to a file. The patch must use the standard \
         @@ -oldStart,oldCount +newStart,newCount @@ hunk format."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to patch (relative to workspace)"
                },
                "diff": {
                    "type": "string",
                    "description": "Unified diff content to apply"
                }
            },
            "required": ["path", "diff"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let path_str = args["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments {
                name: "apply_patch".into(),
                reason: "'path' parameter is required".into(),
            })?;
        let diff = args["diff"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments {
                name: "apply_patch".into(),
                reason: "'diff' parameter is required".into(),
            })?;

        let path = crate::file::validate_workspace_path(&self.workspace, path_str, "apply_patch")?;

        if let Some(stdout) = self.try_system_patch(&path, diff).await {
            debug!(path = %path.display(), "Applied patch via system `patch`");
            return Ok(ToolOutput::text(format!(
                "Patched '{}' via system patch\n{}",
                path_str, stdout
            ))
            .with_artifact(Artifact::FileModified {
                path: PathBuf::from(path_str),
                diff: diff.to_string(),
            }));
        }

        let original =
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    name: "apply_patch".into(),
                    message: format!("Failed to read '{}': {}", path_str, e),
                })?;

        let hunks = parse_hunks(diff).map_err(|e| ToolError::ExecutionFailed {
            name: "apply_patch".into(),
            message: e,
        })?;

        let patched = apply_hunks(&original, &hunks).map_err(|e| ToolError::ExecutionFailed {
            name: "apply_patch".into(),
            message: e,
        })?;

        tokio::fs::write(&path, &patched)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: "apply_patch".into(),
                message: format!("Failed to write '{}': {}", path_str, e),
            })?;

        Ok(
            ToolOutput::text(format!("Patched '{}' ({} hunks applied)", path_str, hunks.len()))
                .with_artifact(Artifact::FileModified {
                    path: PathBuf::from(path_str),
                    diff: diff.to_string(),
                }),
        )
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Write
    }
}
