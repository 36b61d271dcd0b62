//! Error types for the external tool bridge.

/// Errors that can occur while spawning, handshaking with, or calling
/// an external tool server.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to spawn external tool server '{name}': {message}")]
    SpawnFailed { name: String, message: String },

    #[error("handshake with external tool server '{name}' failed: {message}")]
    HandshakeFailed { name: String, message: String },

    #[error("external tool server '{name}' is unavailable")]
    ServerUnavailable { name: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("failed to parse message from external tool server: {message}")]
    Parse { message: String },

    #[error("tool '{name}' failed: {message}")]
    ToolError { name: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
