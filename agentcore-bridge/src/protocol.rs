//! Wire-format types for the external tool server protocol.
//!
//! Line-delimited JSON over a child process's stdio. No JSON-RPC envelope,
//! no request/response ids: the transport serialises one outstanding request
//! per child (see [`crate::bridge::ExternalToolBridge`]), so correlation by
//! position is sufficient.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message sent from the bridge to a child tool server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum BridgeRequest {
    /// Minimal capability-exchange handshake, sent once right after spawn.
    #[serde(rename = "handshake")]
    Handshake { client: String, version: String },
    /// List the tools the server exposes.
    #[serde(rename = "list_tools")]
    ListTools,
    /// Invoke a tool by name with arguments.
    #[serde(rename = "call_tool")]
    CallTool { name: String, args: Value },
}

/// Reply to [`BridgeRequest::Handshake`].
#[derive(Debug, Clone, Deserialize)]
pub struct HandshakeResponse {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// A tool description as advertised by an external tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: Value,
}

/// Reply to [`BridgeRequest::ListTools`].
#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResponse {
    pub tools: Vec<ExternalToolSpec>,
}

/// A single content block inside a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
}

/// Reply to [`BridgeRequest::CallTool`].
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolResponse {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: Option<bool>,
}

impl CallToolResponse {
    /// Concatenate all text blocks into a single string for the ToolResult envelope.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
