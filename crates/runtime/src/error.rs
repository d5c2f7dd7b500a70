use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    /// A provider could not be spawned or failed its handshake.
    #[error("failed to start provider {provider}: {reason}")]
    Startup { provider: String, reason: String },

    #[error(transparent)]
    Mcp(#[from] mcp::Error),

    #[error(transparent)]
    Approval(#[from] approval::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
