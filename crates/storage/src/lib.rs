//! Conversation state and audit storage for Gangway.
//!
//! # Overview
//!
//! The storage layer keeps two views of every conversation:
//!
//! 1. **Conversation Store**: the in-memory, per-user message log and
//!    last-known identity that feeds the planner's bounded context window.
//!    Each session has its own fair lock so concurrent requests for the same
//!    user are processed in arrival order.
//!
//! 2. **Audit Log**: an append-only SQLite [`EventStore`] that records every
//!    message plus every proposal, approval, denial and tool outcome. It is
//!    the complete "why did it do that?" trail and is never trimmed. Writes
//!    go through an [`AuditLog`] worker so SQLite never blocks an async task.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use storage::{ConversationEntry, ConversationStore, EventStore, SessionToken};
//!
//! # async fn example() -> storage::Result<()> {
//! let audit = Arc::new(EventStore::open("audit.db")?);
//! let conversations = ConversationStore::with_audit(audit.clone());
//!
//! let token = SessionToken::new();
//! let mut session = conversations.lock(&token).await;
//! session.append(ConversationEntry::user("search flights from ATH to BCN"));
//! let context = session.recent(6);
//! drop(session);
//! conversations.flush_audit().await;
//!
//! for summary in audit.list_sessions()? {
//!     println!("{}: {} messages", summary.session, summary.message_count);
//! }
//! # let _ = context;
//! # Ok(())
//! # }
//! ```

mod audit;
mod conversation;
mod error;
mod event;
mod store;

pub use audit::AuditLog;
pub use conversation::{ConversationStore, SessionGuard, UserSession};
pub use error::{Error, Result};
pub use event::{ConversationEntry, Event, EventKind, Identity, Role, SessionToken};
pub use store::{EventStore, SessionSummary};
