//! `ExternalToolBridge` — spawns configured tool-server processes, performs
//! the handshake, discovers their tools, and proxies `call_tool` into them.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::BridgeError;
use crate::protocol::{
    BridgeRequest, CallToolResponse, ExternalToolSpec, HandshakeResponse, ListToolsResponse,
};
use crate::transport::{ProcessTransport, Transport};

/// Configuration for a single external tool server.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExternalToolServerConfig {
    /// Server name; used as the prefix for every tool it exposes.
    pub name: String,
    /// Command used to spawn the server process.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// A tool discovered from a connected external server, with its owning
/// server's name attached so the bridge knows where to route calls.
#[derive(Debug, Clone)]
pub struct BridgeTool {
    pub server: String,
    pub spec: ExternalToolSpec,
}

impl BridgeTool {
    /// The name this tool should be registered under, `<server>.<tool>`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.server, self.spec.name)
    }
}

struct ConnectedServer {
    transport: Mutex<ProcessTransport>,
    child: Mutex<tokio::process::Child>,
}

/// Manages the lifecycle of every configured external tool server and
/// routes `call_tool` invocations to the right child process.
pub struct ExternalToolBridge {
    servers: HashMap<String, ConnectedServer>,
    tools: Vec<BridgeTool>,
}

impl ExternalToolBridge {
    /// Spawn and handshake with every configured server. Servers that fail
    /// to start or handshake are logged and skipped; the bridge still comes
    /// up with whatever servers succeeded.
    pub async fn connect(configs: &[ExternalToolServerConfig]) -> Self {
        let mut servers = HashMap::new();
        let mut tools = Vec::new();

        for config in configs {
            match Self::connect_one(config).await {
                Ok((connected, specs)) => {
                    info!(
                        server = %config.name,
                        tool_count = specs.len(),
                        "connected to external tool server"
                    );
                    for spec in specs {
                        tools.push(BridgeTool {
                            server: config.name.clone(),
                            spec,
                        });
                    }
                    servers.insert(config.name.clone(), connected);
                }
                Err(err) => {
                    warn!(server = %config.name, error = %err, "external tool server unavailable");
                }
            }
        }

        Self { servers, tools }
    }

    async fn connect_one(
        config: &ExternalToolServerConfig,
    ) -> Result<(ConnectedServer, Vec<ExternalToolSpec>), BridgeError> {
        let (mut transport, child) =
            ProcessTransport::spawn(&config.command, &config.args, &config.env)
                .await
                .map_err(|e| BridgeError::SpawnFailed {
                    name: config.name.clone(),
                    message: e.to_string(),
                })?;

        let handshake = BridgeRequest::Handshake {
            client: "agentcore".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        send(&mut transport, &handshake).await.map_err(|e| {
            BridgeError::HandshakeFailed {
                name: config.name.clone(),
                message: e.to_string(),
            }
        })?;
        let _: HandshakeResponse = recv(&mut transport).await.map_err(|e| {
            BridgeError::HandshakeFailed {
                name: config.name.clone(),
                message: e.to_string(),
            }
        })?;

        send(&mut transport, &BridgeRequest::ListTools)
            .await
            .map_err(|e| BridgeError::HandshakeFailed {
                name: config.name.clone(),
                message: e.to_string(),
            })?;
        let list: ListToolsResponse = recv(&mut transport).await.map_err(|e| {
            BridgeError::HandshakeFailed {
                name: config.name.clone(),
                message: e.to_string(),
            }
        })?;

        Ok((
            ConnectedServer {
                transport: Mutex::new(transport),
                child: Mutex::new(child),
            },
            list.tools,
        ))
    }

    /// All tools discovered across every connected server, qualified by
    /// server name.
    pub fn tools(&self) -> &[BridgeTool] {
        &self.tools
    }

    /// Call `tool` (unqualified, as the server knows it) on `server`.
    ///
    /// Returns `Err(ServerUnavailable)` if the server never connected or has
    /// since crashed — the registry turns this into a failed `ToolResult`.
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        args: Value,
    ) -> Result<CallToolResponse, BridgeError> {
        let connected = self
            .servers
            .get(server)
            .ok_or_else(|| BridgeError::ServerUnavailable {
                name: server.to_string(),
            })?;

        // One outstanding request per child at a time; the line protocol has
        // no correlation id, so concurrent calls on the same child would
        // race their responses.
        let mut transport = connected.transport.lock().await;

        if let Ok(mut child) = connected.child.try_lock() {
            if let Ok(Some(_status)) = child.try_wait() {
                return Err(BridgeError::ServerUnavailable {
                    name: server.to_string(),
                });
            }
        }

        let request = BridgeRequest::CallTool {
            name: tool.to_string(),
            args,
        };
        send(&mut transport, &request)
            .await
            .map_err(|e| BridgeError::Transport {
                message: e.to_string(),
            })?;
        recv(&mut transport).await
    }

    /// Close every connected child process. Errors during shutdown are
    /// logged, never propagated.
    pub async fn shutdown(&self) {
        for (name, connected) in &self.servers {
            let mut transport = connected.transport.lock().await;
            if let Err(e) = transport.close().await {
                warn!(server = %name, error = %e, "error closing external tool server transport");
            }
            let mut child = connected.child.lock().await;
            if let Err(e) = child.start_kill() {
                warn!(server = %name, error = %e, "error terminating external tool server process");
            }
        }
    }
}

async fn send<T: Transport>(transport: &mut T, request: &BridgeRequest) -> Result<(), BridgeError> {
    let line = serde_json::to_string(request)?;
    transport
        .write_message(&line)
        .await
        .map_err(|e| BridgeError::Transport {
            message: e.to_string(),
        })
}

async fn recv<T: Transport, R: serde::de::DeserializeOwned>(
    transport: &mut T,
) -> Result<R, BridgeError> {
    let raw = transport
        .read_message()
        .await
        .map_err(|e| BridgeError::Transport {
            message: e.to_string(),
        })?
        .ok_or_else(|| BridgeError::Transport {
            message: "transport closed while waiting for a response".into(),
        })?;
    serde_json::from_str(&raw).map_err(|e| BridgeError::Parse {
        message: format!("{e}: {raw}"),
    })
}
