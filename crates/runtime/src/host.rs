//! The tool-call host: submit a query, then authorize or deny what it proposed.

use std::sync::Arc;
use std::time::Duration;

use approval::{Arguments, Gate, PendingProposal, RequestToken, Resolution};
use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};
use serde_json::Value;
use storage::{ConversationEntry, ConversationStore, EventKind, Identity, SessionToken};

use crate::Result;
use crate::backend::LlmBackend;
use crate::executor::{Executor, Outcome};
use crate::planner::{Plan, Planner};
use crate::prompt;
use crate::registry::Registry;
use crate::router::Router;
use crate::tools::{ToolDescriptor, ToolProvider};

/// Appended to the conversation when the user rejects a proposal.
pub const DENIED_REPLY: &str = "Tool call was denied by user.";

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Conversation entries fed to the planner (three exchanges by default).
    pub context_messages: usize,
    /// How long a proposal may wait for a decision. `None` keeps it forever.
    pub proposal_ttl: Option<Duration>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            context_messages: 6,
            proposal_ttl: Some(Duration::from_secs(900)),
        }
    }
}

/// A proposal awaiting the user's decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorizationRequest {
    pub request: RequestToken,
    pub tool: String,
    pub args: Arguments,
}

/// Response to [`Host::submit`] and [`Host::resolve_auth`].
///
/// Serializes with a derived `needs_authorization` flag; `authorization` is
/// present only when it is set.
#[derive(Debug, Clone)]
pub struct Reply {
    pub reply: String,
    pub session: SessionToken,
    pub authorization: Option<AuthorizationRequest>,
}

impl Reply {
    pub fn needs_authorization(&self) -> bool {
        self.authorization.is_some()
    }
}

impl Serialize for Reply {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Reply", 4)?;
        state.serialize_field("reply", &self.reply)?;
        state.serialize_field("session", &self.session)?;
        state.serialize_field("needs_authorization", &self.needs_authorization())?;
        match &self.authorization {
            Some(authorization) => state.serialize_field("authorization", authorization)?,
            None => state.skip_field("authorization")?,
        }
        state.end()
    }
}

pub struct Host<P, B> {
    registry: Registry<P>,
    conversations: ConversationStore,
    gate: Gate,
    planner: Planner<B>,
    executor: Executor<B>,
    config: HostConfig,
}

impl<P: ToolProvider, B: LlmBackend> Host<P, B> {
    pub fn new(
        registry: Registry<P>,
        backend: Arc<B>,
        conversations: ConversationStore,
        config: HostConfig,
    ) -> Self {
        let gate = match config.proposal_ttl {
            Some(ttl) => Gate::with_ttl(ttl),
            None => Gate::new(),
        };
        Self {
            registry,
            conversations,
            gate,
            planner: Planner::new(backend.clone()),
            executor: Executor::new(backend),
            config,
        }
    }

    /// Answer `query` directly, or propose a tool call that needs approval.
    ///
    /// Without a session token a fresh session is started. A supplied
    /// identity replaces the one on record. Requests for the same session
    /// are handled one at a time, in arrival order.
    pub async fn submit(
        &self,
        query: &str,
        session: Option<SessionToken>,
        identity: Option<Identity>,
    ) -> Reply {
        let token = session.unwrap_or_default();
        let mut session = self.conversations.lock(&token).await;

        if let Some(identity) = identity {
            session.set_identity(identity);
        }
        let context = session.recent(self.config.context_messages);
        let identity = session.identity().cloned();

        let catalog = self.catalog().await;
        let plan = self
            .planner
            .plan(query, &catalog, &context, identity.as_ref())
            .await;

        session.append(ConversationEntry::user(query));

        match plan {
            Plan::Answer(text) => {
                session.append(ConversationEntry::assistant(text.clone()));
                Reply {
                    reply: text,
                    session: token,
                    authorization: None,
                }
            }
            Plan::Propose(proposal) => {
                let reply = prompt::authorization_request(&proposal);
                let tool = proposal.tool.clone();
                let args = proposal.args.clone();

                let pending = PendingProposal::new(proposal, query, token.clone())
                    .with_context(context)
                    .with_identity(identity);
                let request = self.gate.submit(pending).await;

                self.conversations.record(
                    &token,
                    EventKind::ToolProposed {
                        request: request.to_string(),
                        name: tool.clone(),
                        input: Value::Object(args.clone()),
                    },
                );
                tracing::info!(session = %token, %request, %tool, "awaiting authorization");

                Reply {
                    reply,
                    session: token,
                    authorization: Some(AuthorizationRequest {
                        request,
                        tool,
                        args,
                    }),
                }
            }
        }
    }

    /// Settle a pending proposal. Approval executes it; denial only records
    /// the refusal.
    ///
    /// Unknown, already-resolved and expired tokens are errors.
    pub async fn resolve_auth(&self, request: RequestToken, approved: bool) -> Result<Reply> {
        let resolution = self.gate.resolve(request, approved).await?;
        let pending = match resolution {
            Resolution::Approved(pending) | Resolution::Denied(pending) => pending,
        };
        let tool = pending.proposal.tool.clone();
        let token = pending.session.clone();
        let mut session = self.conversations.lock(&token).await;

        if !approved {
            self.conversations.record(
                &token,
                EventKind::ToolDenied {
                    request: request.to_string(),
                    name: tool.clone(),
                },
            );
            tracing::info!(session = %token, %request, %tool, "tool call denied");
            session.append(ConversationEntry::assistant(DENIED_REPLY));
            return Ok(Reply {
                reply: DENIED_REPLY.to_string(),
                session: token,
                authorization: None,
            });
        }

        self.conversations.record(
            &token,
            EventKind::ToolApproved {
                request: request.to_string(),
                name: tool.clone(),
            },
        );
        tracing::info!(session = %token, %request, %tool, "tool call approved");

        let connections = self.registry.snapshot().await;
        let execution = self
            .executor
            .execute(&Router::new(&connections), &pending)
            .await;

        let event = match execution.outcome {
            Outcome::Completed { output } => EventKind::ToolResult { name: tool, output },
            Outcome::NotFound => EventKind::ToolFailed {
                error: format!("tool not found: {tool}"),
                name: tool,
            },
            Outcome::Failed { error } => EventKind::ToolFailed { name: tool, error },
        };
        self.conversations.record(&token, event);
        session.append(ConversationEntry::assistant(execution.reply.clone()));

        Ok(Reply {
            reply: execution.reply,
            session: token,
            authorization: None,
        })
    }

    /// The live combined catalog of every connected provider.
    pub async fn catalog(&self) -> Vec<ToolDescriptor> {
        let connections = self.registry.snapshot().await;
        Router::new(&connections).catalog().await
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Stop every provider, discard unanswered proposals and wait for the
    /// audit log to catch up.
    pub async fn shutdown(&self) {
        let dropped = self.gate.clear().await;
        if dropped > 0 {
            tracing::info!(dropped, "discarded pending proposals");
        }
        self.registry.stop().await;
        self.conversations.flush_audit().await;
    }
}
