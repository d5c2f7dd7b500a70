//! MCP error types.

use crate::protocol::JsonRpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to spawn provider: {0}")]
    Spawn(std::io::Error),

    #[error("provider I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("provider script not found: {0}")]
    ScriptNotFound(String),

    #[error("provider not initialized")]
    NotInitialized,

    #[error("provider exited unexpectedly")]
    ProviderExited,

    #[error("timeout waiting for response to {method}")]
    Timeout { method: String },

    #[error("failed to encode or decode message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    #[error("tool call failed: {0}")]
    ToolCallFailed(String),

    #[error("output too large: {size} bytes (max {max})")]
    OutputTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
