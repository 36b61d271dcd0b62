//! # agentcore-bridge
//!
//! The external tool bridge: dynamically extends the agent's tool catalog by
//! spawning tool-server child processes described in configuration and
//! speaking newline-delimited JSON with them over stdio.
//!
//! ## Architecture
//!
//! ```text
//! ExternalToolBridge <-> ProcessTransport (NDJSON over stdio) <-> child tool server
//! ```
//!
//! Each configured server is spawned once, handshaked, and asked to list its
//! tools; those tools are registered into the agent's tool registry under a
//! `<server>.<tool>` name. A crashed or never-connected server's tools report
//! `success:false, error:"server unavailable"` for the remainder of the
//! session rather than being retried mid-task.

pub mod bridge;
pub mod error;
pub mod protocol;
pub mod transport;

pub use bridge::{BridgeTool, ExternalToolBridge, ExternalToolServerConfig};
pub use error::BridgeError;
