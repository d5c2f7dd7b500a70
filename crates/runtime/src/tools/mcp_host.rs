//! MCP-backed tool provider.

use approval::Arguments;
use mcp::Connection;

use super::{ToolDescriptor, ToolError, ToolOutput, ToolProvider};

impl ToolProvider for Connection {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let tools = Connection::list_tools(self).await?;
        Ok(tools.into_iter().map(ToolDescriptor::from).collect())
    }

    async fn call_tool(&self, name: &str, args: &Arguments) -> Result<ToolOutput, ToolError> {
        let result = Connection::call_tool(self, name, Some(args.clone())).await?;
        Ok(ToolOutput::from(result))
    }

    async fn shutdown(self) {
        let name = self.name().to_string();
        if let Err(e) = Connection::shutdown(self).await {
            tracing::warn!(provider = %name, error = %e, "provider shutdown failed");
        }
    }
}
