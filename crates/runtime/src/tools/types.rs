//! Tool-related types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool definition as listed by its provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

impl From<mcp::Tool> for ToolDescriptor {
    fn from(tool: mcp::Tool) -> Self {
        Self {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            schema: tool.input_schema,
        }
    }
}

/// The raw result of a successful tool call, as text for the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub text: String,
}

impl ToolOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl From<mcp::CallToolResult> for ToolOutput {
    /// Text blocks are joined; results without any text (structured-only or
    /// binary content) fall back to their JSON form.
    fn from(result: mcp::CallToolResult) -> Self {
        let text = result.text();
        if !text.is_empty() {
            return Self { text };
        }
        let text = match &result.structured_content {
            Some(structured) => structured.to_string(),
            None => serde_json::to_string(&result.content).unwrap_or_default(),
        };
        Self { text }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_from_mcp_tool() {
        let tool: mcp::Tool = serde_json::from_value(serde_json::json!({
            "name": "get_user_bookings",
            "inputSchema": {"type": "object", "properties": {"user_id": {"type": "string"}}}
        }))
        .unwrap();
        let descriptor = ToolDescriptor::from(tool);
        assert_eq!(descriptor.name, "get_user_bookings");
        assert_eq!(descriptor.description, "");
        assert_eq!(descriptor.schema["properties"]["user_id"]["type"], "string");
    }

    #[test]
    fn output_prefers_text_blocks() {
        let result: mcp::CallToolResult = serde_json::from_value(serde_json::json!({
            "content": [{"type": "text", "text": "Booking BK-1 confirmed"}],
            "structuredContent": {"booking_id": "BK-1"}
        }))
        .unwrap();
        assert_eq!(ToolOutput::from(result).text, "Booking BK-1 confirmed");
    }

    #[test]
    fn output_falls_back_to_structured_content() {
        let result: mcp::CallToolResult = serde_json::from_value(serde_json::json!({
            "content": [],
            "structuredContent": {"seats_left": 3}
        }))
        .unwrap();
        assert_eq!(ToolOutput::from(result).text, r#"{"seats_left":3}"#);
    }
}
