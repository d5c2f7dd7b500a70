//! Tool provider trait.

use std::future::Future;

use approval::Arguments;

use crate::tools::{ToolDescriptor, ToolError, ToolOutput};

/// A connected process exposing named, schema-described tools.
///
/// Implementations own their channel exclusively. Concurrent calls on one
/// provider are allowed; any framing or ordering they need is the
/// implementation's concern.
pub trait ToolProvider: Send + Sync {
    /// The provider's current catalog. Never cached by the host.
    fn list_tools(&self) -> impl Future<Output = Result<Vec<ToolDescriptor>, ToolError>> + Send;

    /// Invoke a tool with arguments the provider validates itself.
    fn call_tool(
        &self,
        name: &str,
        args: &Arguments,
    ) -> impl Future<Output = Result<ToolOutput, ToolError>> + Send;

    /// Release the provider's channel and process.
    fn shutdown(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized;
}
