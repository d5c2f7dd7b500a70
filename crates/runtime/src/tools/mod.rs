//! Tool providers: the seam between the host and provider processes.

pub mod errors;
mod mcp_host;
mod provider;
mod types;

pub use errors::ToolError;
pub use provider::ToolProvider;
pub use types::{ToolDescriptor, ToolOutput};
