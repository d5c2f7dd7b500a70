use thiserror::Error;

/// Errors that can occur while resolving or invoking a tool.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// No connected provider lists a tool with this name.
    #[error("tool not found: {0}")]
    NotFound(String),
    /// The provider or its transport failed.
    #[error("{0}")]
    Provider(String),
    #[error("timed out waiting for {0}")]
    Timeout(String),
}

impl From<mcp::Error> for ToolError {
    fn from(e: mcp::Error) -> Self {
        match e {
            mcp::Error::Timeout { method } => ToolError::Timeout(method),
            mcp::Error::ToolCallFailed(message) => ToolError::Provider(message),
            other => ToolError::Provider(other.to_string()),
        }
    }
}
