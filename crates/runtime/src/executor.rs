//! Runs approved proposals and narrates their results.

use std::sync::Arc;

use approval::PendingProposal;

use crate::backend::LlmBackend;
use crate::prompt;
use crate::router::Router;
use crate::tools::{ToolError, ToolProvider};

/// What happened to the tool call itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed { output: String },
    NotFound,
    Failed { error: String },
}

/// The user-facing reply plus the underlying outcome.
#[derive(Debug, Clone)]
pub struct Execution {
    pub reply: String,
    pub outcome: Outcome,
}

pub struct Executor<B> {
    backend: Arc<B>,
}

impl<B: LlmBackend> Executor<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Invoke an approved proposal and describe the result in prose.
    ///
    /// Never fails: unknown tools and provider errors become plain-language
    /// explanations. The narration is returned verbatim, even if the model
    /// ignored the instruction not to answer with JSON.
    pub async fn execute<P: ToolProvider>(
        &self,
        router: &Router<'_, P>,
        pending: &PendingProposal,
    ) -> Execution {
        let tool = pending.proposal.tool.as_str();
        let args = &pending.proposal.args;

        let connection = match router.resolve(tool).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(tool, error = %e, "approved tool could not be resolved");
                let reply = self
                    .explain(
                        prompt::not_found_prompt(&pending.query, tool),
                        format!(
                            "Sorry, the action '{tool}' isn't available from any connected service right now."
                        ),
                    )
                    .await;
                return Execution {
                    reply,
                    outcome: Outcome::NotFound,
                };
            }
        };

        tracing::info!(tool, provider = %connection.id, "invoking tool");
        match connection.provider.call_tool(tool, args).await {
            Ok(output) => {
                tracing::debug!(tool, bytes = output.text.len(), "tool returned");
                let narration = prompt::narration_prompt(
                    &pending.query,
                    tool,
                    args,
                    &output.text,
                    pending.identity.as_ref(),
                );
                let reply = self
                    .explain(
                        narration,
                        format!(
                            "The '{tool}' action completed, but I couldn't summarize the result. Here it is as returned:\n\n{}",
                            output.text
                        ),
                    )
                    .await;
                Execution {
                    reply,
                    outcome: Outcome::Completed {
                        output: output.text,
                    },
                }
            }
            Err(e) => {
                tracing::warn!(tool, provider = %connection.id, error = %e, "tool call failed");
                let error = match &e {
                    ToolError::Timeout(_) => "the service did not respond in time".to_string(),
                    other => other.to_string(),
                };
                let reply = self
                    .explain(
                        prompt::failure_prompt(&pending.query, tool, args, &error),
                        format!(
                            "Sorry, I couldn't complete the '{tool}' action right now. Please try again later."
                        ),
                    )
                    .await;
                Execution {
                    reply,
                    outcome: Outcome::Failed { error },
                }
            }
        }
    }

    async fn explain(&self, prompt: String, fallback: String) -> String {
        match self.backend.complete(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => fallback,
            Err(e) => {
                tracing::warn!(error = %e, "explanation completion failed");
                fallback
            }
        }
    }
}
