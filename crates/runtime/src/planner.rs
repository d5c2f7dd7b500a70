//! Turns an utterance into a direct answer or a single tool proposal.

use std::sync::{Arc, LazyLock};

use approval::{Arguments, ToolProposal};
use chrono::Local;
use regex::Regex;
use serde_json::{Map, Value};
use storage::{ConversationEntry, Identity};

use crate::backend::LlmBackend;
use crate::prompt;
use crate::tools::ToolDescriptor;

/// Shown when the planning completion itself fails.
pub const PLANNING_FALLBACK: &str =
    "Sorry, I couldn't process your request right now. Please try again in a moment.";

static FENCED_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap());

/// What the planner decided.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Text to return to the user as-is.
    Answer(String),
    /// A tool call that needs approval before anything runs.
    Propose(ToolProposal),
}

/// One completion call per utterance; never invokes a tool.
pub struct Planner<B> {
    backend: Arc<B>,
}

impl<B: LlmBackend> Planner<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub async fn plan(
        &self,
        query: &str,
        catalog: &[ToolDescriptor],
        context: &[ConversationEntry],
        identity: Option<&Identity>,
    ) -> Plan {
        let prompt = prompt::planning_prompt(catalog, context, identity, query, Local::now());

        let response = match self.backend.complete(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "planning completion failed");
                return Plan::Answer(PLANNING_FALLBACK.to_string());
            }
        };

        let plan = parse_plan(&response);
        match &plan {
            Plan::Propose(proposal) => tracing::info!(tool = %proposal.tool, "planned tool call"),
            Plan::Answer(_) => tracing::debug!("planned direct answer"),
        }
        plan
    }
}

/// Interpret a raw completion. Anything that is not a well-formed tool call
/// is the answer itself.
pub fn parse_plan(response: &str) -> Plan {
    extract_json(response)
        .and_then(proposal_from)
        .map(Plan::Propose)
        .unwrap_or_else(|| Plan::Answer(response.to_string()))
}

/// Pull one JSON object out of model output.
///
/// A fenced block wins when present; otherwise the whole trimmed text must
/// parse. Arrays, scalars and malformed JSON yield `None`.
pub fn extract_json(text: &str) -> Option<Map<String, Value>> {
    let candidate = match FENCED_OBJECT.captures(text) {
        Some(captures) => captures.get(1)?.as_str(),
        None => text.trim(),
    };

    match serde_json::from_str(candidate) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

fn proposal_from(mut object: Map<String, Value>) -> Option<ToolProposal> {
    let tool = match object.remove("tool")? {
        Value::String(tool) if !tool.is_empty() => tool,
        _ => return None,
    };

    let args: Arguments = match object.remove("args") {
        None | Some(Value::Null) => Arguments::new(),
        Some(Value::Object(args)) => args,
        Some(_) => return None,
    };

    Some(ToolProposal::new(tool, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedBackend, args, tool};
    use serde_json::json;

    #[tokio::test]
    async fn route_query_becomes_search_proposal() {
        let backend = Arc::new(ScriptedBackend::new([
            r#"{"tool": "search_flights", "args": {"origin": "ATH", "destination": "BCN", "date": "2025-12-03"}}"#,
        ]));
        let planner = Planner::new(backend.clone());

        let plan = planner
            .plan(
                "search flights from ATH to BCN on 2025-12-03",
                &[tool("search_flights")],
                &[],
                None,
            )
            .await;

        assert_eq!(
            plan,
            Plan::Propose(ToolProposal::new(
                "search_flights",
                args(json!({"origin": "ATH", "destination": "BCN", "date": "2025-12-03"}))
            ))
        );
        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("- search_flights:"));
    }

    #[tokio::test]
    async fn free_text_is_the_answer() {
        let backend = Arc::new(ScriptedBackend::new(["I'm your flight booking assistant!"]));
        let plan = Planner::new(backend)
            .plan("what is your name?", &[], &[], None)
            .await;
        assert_eq!(
            plan,
            Plan::Answer("I'm your flight booking assistant!".to_string())
        );
    }

    #[tokio::test]
    async fn failed_completion_degrades_to_apology() {
        let backend = Arc::new(ScriptedBackend::default().then_fail());
        let plan = Planner::new(backend).plan("hello", &[], &[], None).await;
        assert_eq!(plan, Plan::Answer(PLANNING_FALLBACK.to_string()));
    }

    #[test]
    fn fenced_block_is_preferred() {
        let response = "Sure, let me look that up.\n```json\n{\"tool\": \"get_user_bookings\", \"args\": {\"user_id\": \"user_001\"}}\n```\nOne moment.";
        assert_eq!(
            parse_plan(response),
            Plan::Propose(ToolProposal::new(
                "get_user_bookings",
                args(json!({"user_id": "user_001"}))
            ))
        );
    }

    #[test]
    fn unlabelled_fence_with_nested_args() {
        let response = "```\n{\"tool\": \"book_flight\", \"args\": {\"passenger\": {\"name\": \"Maria\"}, \"seats\": 2}}\n```";
        let Plan::Propose(proposal) = parse_plan(response) else {
            panic!("expected proposal");
        };
        assert_eq!(proposal.tool, "book_flight");
        assert_eq!(proposal.args["passenger"]["name"], "Maria");
        assert_eq!(proposal.args["seats"], 2);
    }

    #[test]
    fn argument_order_is_preserved() {
        let Plan::Propose(proposal) =
            parse_plan(r#"{"tool": "search_flights", "args": {"origin": "ATH", "destination": "BCN", "date": "2025-12-03"}}"#)
        else {
            panic!("expected proposal");
        };
        let keys: Vec<_> = proposal.args.keys().map(String::as_str).collect();
        assert_eq!(keys, ["origin", "destination", "date"]);
    }

    #[test]
    fn missing_args_default_to_empty_and_extra_keys_are_ignored() {
        assert_eq!(
            parse_plan(r#"{"tool": "get_user_bookings", "reason": "user asked"}"#),
            Plan::Propose(ToolProposal::new("get_user_bookings", Arguments::new()))
        );
        assert_eq!(
            parse_plan(r#"{"tool": "get_user_bookings", "args": null}"#),
            Plan::Propose(ToolProposal::new("get_user_bookings", Arguments::new()))
        );
    }

    #[test]
    fn objects_without_a_usable_tool_are_answers() {
        for response in [
            r#"{"answer": "42"}"#,
            r#"{"tool": 7, "args": {}}"#,
            r#"{"tool": "", "args": {}}"#,
            r#"{"tool": "search_flights", "args": ["ATH", "BCN"]}"#,
            r#"[{"tool": "search_flights"}]"#,
            r#"{"tool": "search_flights""#,
            "",
        ] {
            assert_eq!(
                parse_plan(response),
                Plan::Answer(response.to_string()),
                "{response}"
            );
        }
    }

    #[test]
    fn extract_json_rejects_non_objects() {
        assert!(extract_json("[1, 2, 3]").is_none());
        assert!(extract_json("\"tool\"").is_none());
        assert!(extract_json("  {\"a\": 1}  ").is_some());
    }
}
