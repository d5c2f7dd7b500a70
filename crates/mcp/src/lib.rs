//! MCP (Model Context Protocol) client for tool-provider processes.
//!
//! Each [`Connection`] owns one provider subprocess and speaks newline-delimited
//! JSON-RPC 2.0 over its stdio.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Connection, LaunchConfig};
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = LaunchConfig::uv_script("providers/flightsearch.py")?;
//! let connection = Connection::connect(config).await?;
//!
//! for tool in connection.list_tools().await? {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let mut args = serde_json::Map::new();
//! args.insert("origin".into(), "ATH".into());
//! args.insert("destination".into(), "BCN".into());
//! args.insert("date".into(), "2025-12-03".into());
//! let result = connection.call_tool("search_flights", Some(args)).await?;
//! println!("{}", result.text());
//!
//! connection.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod connection;
mod error;
mod protocol;

pub use connection::{Connection, DEFAULT_TIMEOUT, LaunchConfig, MAX_OUTPUT_SIZE};
pub use error::{Error, Result};
pub use protocol::{
    CallToolResult, InitializeResult, JsonRpcError, PROTOCOL_VERSION, RequestId, ServerInfo,
    Tool, ToolContent,
};
