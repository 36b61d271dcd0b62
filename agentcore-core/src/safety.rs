//! Safety Guardian — enforces safety policies at every execution boundary.
//!
//! Implements a multi-layer defense model:
//! 1. Input validation (explicit deny lists for paths/commands/hosts)
//! 2. Authorization (approval-mode dispatch by risk level)
//! 3. Session-scoped "approve all similar" allowlisting
//! 4. Audit logging

use crate::config::{ApprovalMode, SafetyConfig};
use crate::types::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Result of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionResult {
    Allowed,
    Denied { reason: String },
    RequiresApproval { context: String },
}

/// Rich context for approval dialogs, providing the user with information
/// to make an informed decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalContext {
    /// WHY the agent wants to perform this action (chain of reasoning).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Alternative actions that could achieve a similar goal.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
    /// What could go wrong if the action is performed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consequences: Vec<String>,
    /// Whether the action can be undone, and how.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversibility: Option<ReversibilityInfo>,
    /// Preview of the changes (diff, command, etc.) for destructive tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl ApprovalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_alternative(mut self, alt: impl Into<String>) -> Self {
        self.alternatives.push(alt.into());
        self
    }

    pub fn with_consequence(mut self, consequence: impl Into<String>) -> Self {
        self.consequences.push(consequence.into());
        self
    }

    pub fn with_reversibility(mut self, info: ReversibilityInfo) -> Self {
        self.reversibility = Some(info);
        self
    }

    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = Some(preview.into());
        self
    }

    /// Auto-generate a preview from tool name and action details for destructive tools.
    pub fn with_preview_from_tool(mut self, tool_name: &str, details: &ActionDetails) -> Self {
        let preview = match (tool_name, details) {
            ("file_write" | "create_file", ActionDetails::FileWrite { path, size_bytes }) => {
                Some(format!("Will write {} bytes to {}", size_bytes, path.display()))
            }
            ("apply_patch" | "smart_edit", ActionDetails::FileWrite { path, .. }) => {
                Some(format!("Will patch {}", path.display()))
            }
            ("file_delete", ActionDetails::FileDelete { path }) => {
                Some(format!("Will delete {}", path.display()))
            }
            ("shell_exec" | "multi_command", ActionDetails::ShellCommand { command }) => {
                let truncated = if command.len() > 200 {
                    let mut end = 200;
                    while end > 0 && !command.is_char_boundary(end) {
                        end -= 1;
                    }
                    format!("{}...", &command[..end])
                } else {
                    command.clone()
                };
                Some(format!("$ {}", truncated))
            }
            ("git_commit", ActionDetails::GitOperation { operation }) => {
                Some(format!("git {}", operation))
            }
            _ => None,
        };
        if let Some(p) = preview {
            self.preview = Some(p);
        }
        self
    }
}

/// Information about whether and how an action can be reversed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReversibilityInfo {
    /// Whether the action is reversible.
    pub is_reversible: bool,
    /// How to reverse the action (e.g., "git checkout -- file.rs").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undo_description: Option<String>,
    /// Time window for reversal, if applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undo_window: Option<String>,
}

/// The decision from an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Approve this single action.
    Approve,
    /// Deny this action.
    Deny,
    /// Approve this action AND all future actions with the same tool+risk level in this session.
    ApproveAllSimilar,
}

/// An action that the agent wants to perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: Uuid,
    pub tool_name: String,
    pub risk_level: RiskLevel,
    pub description: String,
    pub details: ActionDetails,
    pub timestamp: DateTime<Utc>,
    /// Rich context for approval dialogs. Optional for backward compatibility.
    #[serde(default)]
    pub approval_context: ApprovalContext,
}

/// Details specific to the type of action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionDetails {
    FileRead {
        path: PathBuf,
    },
    FileWrite {
        path: PathBuf,
        size_bytes: usize,
    },
    FileDelete {
        path: PathBuf,
    },
    ShellCommand {
        command: String,
    },
    NetworkRequest {
        host: String,
        method: String,
    },
    GitOperation {
        operation: String,
    },
    Other {
        info: String,
    },
}

/// An entry in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    pub event: AuditEvent,
}

/// Types of events that can be audited.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    ActionRequested {
        tool: String,
        risk_level: RiskLevel,
        description: String,
    },
    ActionApproved {
        tool: String,
    },
    ActionDenied {
        tool: String,
        reason: String,
    },
    ActionExecuted {
        tool: String,
        success: bool,
        duration_ms: u64,
    },
    ApprovalRequested {
        tool: String,
        context: String,
    },
    ApprovalDecision {
        tool: String,
        approved: bool,
    },
}

/// The Safety Guardian enforcing all safety policies.
pub struct SafetyGuardian {
    config: SafetyConfig,
    session_id: Uuid,
    audit_log: VecDeque<AuditEntry>,
    max_audit_entries: usize,
    /// Session-scoped allowlist: tool+risk combinations that were approved via "approve all similar".
    session_allowlist: HashSet<(String, RiskLevel)>,
}

impl SafetyGuardian {
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4(),
            audit_log: VecDeque::new(),
            max_audit_entries: 10_000,
            session_allowlist: HashSet::new(),
        }
    }

    /// Check whether an action is permitted under current safety policy.
    pub fn check_permission(&mut self, action: &ActionRequest) -> PermissionResult {
        // Layer 1: Check denied patterns first (always denied regardless of mode)
        if let Some(reason) = self.check_denied(action) {
            self.log_event(AuditEvent::ActionDenied {
                tool: action.tool_name.clone(),
                reason: reason.clone(),
            });
            return PermissionResult::Denied { reason };
        }

        // Layer 1.9: Check session-scoped allowlist ("approve all similar")
        if self
            .session_allowlist
            .contains(&(action.tool_name.clone(), action.risk_level))
        {
            self.log_event(AuditEvent::ActionApproved {
                tool: action.tool_name.clone(),
            });
            return PermissionResult::Allowed;
        }

        // Layer 2: Check based on approval mode and risk level
        let result = match self.config.approval_mode {
            ApprovalMode::Yolo => PermissionResult::Allowed,
            ApprovalMode::Safe => self.check_safe_mode(action),
            ApprovalMode::Cautious => self.check_cautious_mode(action),
            ApprovalMode::Paranoid => PermissionResult::RequiresApproval {
                context: format!(
                    "{} (risk: {}) — paranoid mode requires approval for all actions",
                    action.description, action.risk_level
                ),
            },
        };

        // Log the result
        match &result {
            PermissionResult::Allowed => {
                self.log_event(AuditEvent::ActionApproved {
                    tool: action.tool_name.clone(),
                });
            }
            PermissionResult::Denied { reason } => {
                self.log_event(AuditEvent::ActionDenied {
                    tool: action.tool_name.clone(),
                    reason: reason.clone(),
                });
            }
            PermissionResult::RequiresApproval { context } => {
                self.log_event(AuditEvent::ApprovalRequested {
                    tool: action.tool_name.clone(),
                    context: context.clone(),
                });
            }
        }

        result
    }

    /// Safe mode: only read-only operations are auto-approved.
    fn check_safe_mode(&self, action: &ActionRequest) -> PermissionResult {
        match action.risk_level {
            RiskLevel::ReadOnly => PermissionResult::Allowed,
            _ => PermissionResult::RequiresApproval {
                context: format!(
                    "{} (risk: {}) — safe mode requires approval for non-read operations",
                    action.description, action.risk_level
                ),
            },
        }
    }

    /// Cautious mode: read-only and reversible writes are auto-approved.
    fn check_cautious_mode(&self, action: &ActionRequest) -> PermissionResult {
        match action.risk_level {
            RiskLevel::ReadOnly | RiskLevel::Write => PermissionResult::Allowed,
            _ => PermissionResult::RequiresApproval {
                context: format!(
                    "{} (risk: {}) — cautious mode requires approval for execute/network/destructive operations",
                    action.description, action.risk_level
                ),
            },
        }
    }

    /// Check explicitly denied patterns.
    fn check_denied(&self, action: &ActionRequest) -> Option<String> {
        match &action.details {
            ActionDetails::FileRead { path }
            | ActionDetails::FileWrite { path, .. }
            | ActionDetails::FileDelete { path } => self.check_path_denied(path),
            ActionDetails::ShellCommand { command } => self.check_command_denied(command),
            ActionDetails::NetworkRequest { host, .. } => self.check_host_denied(host),
            _ => None,
        }
    }

    /// Check if a file path is denied.
    ///
    /// Normalizes the path before matching to prevent traversal bypasses
    /// (e.g., `../secrets/key.pem` bypassing `**/secrets/**`).
    fn check_path_denied(&self, path: &Path) -> Option<String> {
        let resolved = Self::normalize_path(path);
        let path_str = resolved.to_string_lossy();
        for pattern in &self.config.denied_paths {
            if Self::glob_matches(pattern, &path_str) {
                return Some(format!(
                    "Path '{}' matches denied pattern '{}'",
                    path_str, pattern
                ));
            }
        }
        None
    }

    /// Normalize a path by resolving `.` and `..` segments.
    ///
    /// Uses manual component-based normalization to avoid expensive `canonicalize()` syscalls.
    /// This handles path traversal attacks (`../../secrets`) without filesystem access.
    fn normalize_path(path: &Path) -> std::path::PathBuf {
        let mut components = Vec::new();
        for component in path.components() {
            match component {
                std::path::Component::ParentDir => {
                    components.pop();
                }
                std::path::Component::CurDir => {}
                c => components.push(c),
            }
        }
        components.iter().collect()
    }

    /// Check if a command is denied.
    fn check_command_denied(&self, command: &str) -> Option<String> {
        let cmd_lower = command.to_lowercase();
        for denied in &self.config.denied_commands {
            if cmd_lower.starts_with(&denied.to_lowercase())
                || cmd_lower.contains(&denied.to_lowercase())
            {
                return Some(format!(
                    "Command '{}' matches denied pattern '{}'",
                    command, denied
                ));
            }
        }
        None
    }

    /// Check if a host is denied (not in allowlist).
    fn check_host_denied(&self, host: &str) -> Option<String> {
        if self.config.allowed_hosts.is_empty() {
            return None; // No allowlist means all allowed
        }
        if !self.config.allowed_hosts.iter().any(|h| h == host) {
            return Some(format!("Host '{}' not in allowed hosts list", host));
        }
        None
    }

    /// Simple glob matching for path patterns.
    /// Supports: `**`, `**/suffix`, `prefix/**`, `**/*.ext`, `**/dir/**`, `*.ext`, `prefix*`
    fn glob_matches(pattern: &str, path: &str) -> bool {
        if pattern == "**" {
            return true;
        }

        // Pattern: **/dir/** — matches any path containing the dir segment
        if pattern.starts_with("**/") && pattern.ends_with("/**") {
            let middle = &pattern[3..pattern.len() - 3];
            let segment = format!("/{}/", middle);
            let starts_with = format!("{}/", middle);
            return path.contains(&segment) || path.starts_with(&starts_with) || path == middle;
        }

        // Pattern: **/*.ext — matches any file with that extension anywhere
        if let Some(suffix) = pattern.strip_prefix("**/") {
            if suffix.starts_with("*.") {
                // Extension match: **/*.key means any path ending with .key
                let ext = &suffix[1..]; // ".key"
                return path.ends_with(ext);
            }
            // Direct suffix match: **/foo matches any path ending in /foo or equal to foo
            return path.ends_with(suffix)
                || path.ends_with(&format!("/{}", suffix))
                || path == suffix;
        }

        // Pattern: prefix/** — matches anything under prefix/
        if let Some(prefix) = pattern.strip_suffix("/**") {
            return path.starts_with(prefix) && path.len() > prefix.len();
        }

        // Pattern: *.ext — matches files with that extension (in current dir)
        if pattern.starts_with("*.") {
            let ext = &pattern[1..]; // ".ext"
            return path.ends_with(ext);
        }

        // Pattern: prefix* — matches anything starting with prefix
        if let Some(prefix) = pattern.strip_suffix("*") {
            return path.starts_with(prefix);
        }

        // Direct match
        path == pattern || path.ends_with(pattern)
    }

    /// Record an event in the audit log.
    fn log_event(&mut self, event: AuditEvent) {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session_id: self.session_id,
            event,
        };
        self.audit_log.push_back(entry);
        if self.audit_log.len() > self.max_audit_entries {
            self.audit_log.pop_front();
        }
    }

    /// Record the result of an action execution.
    pub fn log_execution(&mut self, tool: &str, success: bool, duration_ms: u64) {
        self.log_event(AuditEvent::ActionExecuted {
            tool: tool.to_string(),
            success,
            duration_ms,
        });
    }

    /// Record a user approval decision.
    pub fn log_approval_decision(&mut self, tool: &str, approved: bool) {
        self.log_event(AuditEvent::ApprovalDecision {
            tool: tool.to_string(),
            approved,
        });
    }

    /// Get the audit log entries.
    pub fn audit_log(&self) -> &VecDeque<AuditEntry> {
        &self.audit_log
    }

    /// Get the session ID.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Get the current approval mode.
    pub fn approval_mode(&self) -> ApprovalMode {
        self.config.approval_mode
    }

    /// Set the approval mode at runtime.
    pub fn set_approval_mode(&mut self, mode: ApprovalMode) {
        self.config.approval_mode = mode;
    }

    /// Get the maximum iterations allowed.
    pub fn max_iterations(&self) -> usize {
        self.config.max_iterations
    }

    /// Add a tool+risk combination to the session-scoped allowlist.
    ///
    /// Future actions with the same tool name and risk level will be auto-approved
    /// for the remainder of this session.
    ///
    /// The allowlist is held in memory only and persists for the entire `SafetyGuardian`
    /// lifetime. It is NOT persisted to disk. There is no individual revocation —
    /// [`clear_session_allowlist`](Self::clear_session_allowlist) removes all entries at once.
    pub fn add_session_allowlist(&mut self, tool_name: String, risk_level: RiskLevel) {
        self.session_allowlist.insert((tool_name, risk_level));
    }

    /// Check if a tool+risk combination is in the session allowlist.
    pub fn is_session_allowed(&self, tool_name: &str, risk_level: RiskLevel) -> bool {
        self.session_allowlist
            .contains(&(tool_name.to_string(), risk_level))
    }

    /// Clear the entire session allowlist, revoking all "approve all similar" grants.
    pub fn clear_session_allowlist(&mut self) {
        self.session_allowlist.clear();
    }

    /// Create an action request helper.
    pub fn create_action_request(
        tool_name: impl Into<String>,
        risk_level: RiskLevel,
        description: impl Into<String>,
        details: ActionDetails,
    ) -> ActionRequest {
        ActionRequest {
            id: Uuid::new_v4(),
            tool_name: tool_name.into(),
            risk_level,
            description: description.into(),
            details,
            timestamp: Utc::now(),
            approval_context: ApprovalContext::default(),
        }
    }

    /// Create an action request with rich approval context.
    pub fn create_rich_action_request(
        tool_name: impl Into<String>,
        risk_level: RiskLevel,
        description: impl Into<String>,
        details: ActionDetails,
        context: ApprovalContext,
    ) -> ActionRequest {
        ActionRequest {
            id: Uuid::new_v4(),
            tool_name: tool_name.into(),
            risk_level,
            description: description.into(),
            details,
            timestamp: Utc::now(),
            approval_context: context,
        }
    }
}
