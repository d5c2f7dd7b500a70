//! Prompt rendering for planning and narration.

use std::fmt::Write;

use approval::{Arguments, ToolProposal};
use chrono::{DateTime, Local};
use storage::{ConversationEntry, Identity};

use crate::tools::ToolDescriptor;

const PLANNER_PREAMBLE: &str = "\
You are a flight booking assistant that can call tools to help users.";

const TOOL_RULES: &str = r#"TOOL CALLING RULES:
1. When you need to use a tool, respond with ONLY a JSON object (no other text):
{
  "tool": "tool_name_here",
  "args": {
    "param1": "value1",
    "param2": "value2"
  }
}

2. If you can answer without a tool, respond normally with helpful text.

EXAMPLES:
User: "search flights from ATH to BCN on 2025-12-03"
Response: {"tool": "search_flights", "args": {"origin": "ATH", "destination": "BCN", "date": "2025-12-03"}}

User: "show me my bookings"
Response: {"tool": "get_user_bookings", "args": {"user_id": "user_001"}}

User: "what is your name?"
Response: I'm your flight booking assistant! I can help you search for flights, manage bookings, and plan your travel.

RESPONSE FORMATTING (for non-tool answers):
- Use **bold** for important info
- Use bullet points for lists
- Use `code` for IDs
- Be clear and concise"#;

const NARRATION_FORMATTING: &str = "\
Formatting guidelines:
- Use **bold** for important information (flight IDs, airports, prices)
- Use bullet points for lists of flights or options
- Use `code` for IDs like flight numbers or booking IDs
- Keep the response clear, organized, and easy to read
- If showing multiple flights, format them in a clean list";

/// Render the single instruction block the planner sends to the model.
pub fn planning_prompt(
    catalog: &[ToolDescriptor],
    context: &[ConversationEntry],
    identity: Option<&Identity>,
    query: &str,
    now: DateTime<Local>,
) -> String {
    let mut prompt = String::new();

    let _ = writeln!(prompt, "{PLANNER_PREAMBLE}\n\nAVAILABLE TOOLS:");
    if catalog.is_empty() {
        prompt.push_str("(no tools)\n");
    }
    for tool in catalog {
        let _ = writeln!(
            prompt,
            "- {}: {} | schema: {}",
            tool.name, tool.description, tool.schema
        );
    }
    let _ = writeln!(prompt, "\n{TOOL_RULES}");

    let _ = write!(
        prompt,
        "\nCurrent date and time: {}",
        now.format("%A, %B %d, %Y at %I:%M %p")
    );

    if let Some(identity) = identity {
        let _ = write!(
            prompt,
            "\n\n{}\n\nIMPORTANT: When the user asks about \"my bookings\" or \"my flights\", \
             automatically use the User ID '{}' to call get_user_bookings. When booking flights, \
             use the name '{}' and email '{}' automatically unless the user specifies different \
             passenger details. Do not ask the user for these details.",
            identity_block(identity),
            identity.id,
            identity.name,
            identity.email
        );
    }

    if !context.is_empty() {
        prompt.push_str("\n\nRecent conversation:");
        for entry in context {
            let _ = write!(prompt, "\n{}: {}", entry.role.label(), entry.text);
        }
    }

    let _ = write!(prompt, "\n\nUser question:\n{query}");
    prompt
}

/// Ask the model to turn a raw tool result into prose for the user.
pub fn narration_prompt(
    query: &str,
    tool: &str,
    args: &Arguments,
    output: &str,
    identity: Option<&Identity>,
) -> String {
    let user_context = identity
        .map(|identity| format!("\n{}\n", identity_block(identity)))
        .unwrap_or_default();

    format!(
        "You are now writing a final answer for the user.\n\
         Do NOT call any tools anymore and do NOT respond with JSON.\n\
         Just answer in normal, helpful natural language.\n\
         {user_context}\n\
         User question:\n{query}\n\n\
         Tool '{tool}' was called with arguments:\n{}\n\n\
         Tool returned (raw result):\n{output}\n\n\
         Please answer the user, summarizing the tool result in a helpful way.\n\n\
         {NARRATION_FORMATTING}\n",
        pretty(args)
    )
}

/// Ask the model to explain a failed tool call in plain language.
pub fn failure_prompt(query: &str, tool: &str, args: &Arguments, error: &str) -> String {
    format!(
        "User question: {query}\n\n\
         There was an error calling the tool:\n\
         Error calling tool '{tool}' with args {}: {error}\n\n\
         Explain the error to the user in normal natural language. \
         Do not mention internal error types.",
        serde_json::Value::Object(args.clone())
    )
}

/// Ask the model to explain that a requested tool does not exist.
pub fn not_found_prompt(query: &str, tool: &str) -> String {
    format!(
        "User question: {query}\n\n\
         Tool '{tool}' was requested but is not offered by any connected service.\n\n\
         Explain this to the user in normal natural language."
    )
}

/// The text shown to the user when a tool call needs their approval.
pub fn authorization_request(proposal: &ToolProposal) -> String {
    format!(
        "The AI wants to call the tool: **{}**\n\nArguments: {}\n\nDo you authorize this action?",
        proposal.tool,
        pretty(&proposal.args)
    )
}

fn identity_block(identity: &Identity) -> String {
    format!(
        "Logged-in user information:\n- User ID: {}\n- Name: {}\n- Email: {}",
        identity.id,
        or_na(&identity.name),
        or_na(&identity.email)
    )
}

fn or_na(value: &str) -> &str {
    if value.is_empty() { "N/A" } else { value }
}

fn pretty(args: &Arguments) -> String {
    serde_json::to_string_pretty(args).unwrap_or_else(|_| "{}".to_string())
}
