//! Gangway runtime: the human-approved tool-call host.
//!
//! This crate composes provider connections, the conversation store and the
//! authorization gate into a [`Host`] with two request shapes: submit a
//! query, and resolve a pending tool call.
//!
//! # Overview
//!
//! - **Registry**: one long-lived connection per tool provider, started in
//!   order and stopped in reverse.
//! - **Router**: finds the provider that owns a tool by asking every
//!   provider for its live catalog.
//! - **Planner**: one model call per query; the reply is either a direct
//!   answer or a single JSON tool proposal.
//! - **Executor**: runs an approved proposal and has the model narrate the
//!   result. Failures are narrated too.
//! - **LlmBackend**: the opaque text-in/text-out completion service.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mcp::LaunchConfig;
//! use runtime::{AnthropicBackend, Host, HostConfig, Registry};
//! use storage::ConversationStore;
//!
//! # async fn example() -> runtime::Result<()> {
//! let registry = Registry::start(vec![
//!     LaunchConfig::uv_script("providers/flightsearch.py")?,
//!     LaunchConfig::uv_script("providers/flightbooking.py")?,
//! ])
//! .await?;
//! let backend = Arc::new(AnthropicBackend::from_env("claude-sonnet-4-20250514")?);
//! let host = Host::new(registry, backend, ConversationStore::new(), HostConfig::default());
//!
//! let reply = host.submit("search flights from ATH to BCN on 2025-12-03", None, None).await;
//! if let Some(auth) = &reply.authorization {
//!     let done = host.resolve_auth(auth.request, true).await?;
//!     println!("{}", done.reply);
//! }
//! host.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod backend;
mod error;
mod executor;
mod host;
mod planner;
pub mod prompt;
mod registry;
mod router;
pub mod tools;

#[cfg(test)]
mod testing;

pub use backend::{AnthropicBackend, AnthropicBackendBuilder, LlmBackend};
pub use error::{Error, Result};
pub use executor::{Execution, Executor, Outcome};
pub use host::{AuthorizationRequest, DENIED_REPLY, Host, HostConfig, Reply};
pub use planner::{PLANNING_FALLBACK, Plan, Planner, extract_json, parse_plan};
pub use registry::{Registry, ToolConnection};
pub use router::Router;
pub use tools::{ToolDescriptor, ToolError, ToolOutput, ToolProvider};
