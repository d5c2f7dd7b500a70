//! Conversation and audit event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque token identifying one end user's conversation.
///
/// Clients may bring their own token (e.g. a browser session id); otherwise
/// one is minted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for SessionToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The author of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One message in a user's conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub text: String,
}

impl ConversationEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// The logged-in user behind a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(alias = "user_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// The kind of event that occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A message was added to the conversation.
    Message { role: Role, content: String },
    /// The planner proposed a tool call and it is awaiting approval.
    ToolProposed {
        request: String,
        name: String,
        input: serde_json::Value,
    },
    /// A human approved a pending tool call.
    ToolApproved { request: String, name: String },
    /// A human denied a pending tool call.
    ToolDenied { request: String, name: String },
    /// A tool returned a result.
    ToolResult { name: String, output: String },
    /// A tool could not be resolved or its invocation failed.
    ToolFailed { name: String, error: String },
}

impl EventKind {
    /// Stable name stored alongside the payload, used for filtering.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Message { .. } => "message",
            EventKind::ToolProposed { .. } => "tool_proposed",
            EventKind::ToolApproved { .. } => "tool_approved",
            EventKind::ToolDenied { .. } => "tool_denied",
            EventKind::ToolResult { .. } => "tool_result",
            EventKind::ToolFailed { .. } => "tool_failed",
        }
    }
}

/// An event in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub session: SessionToken,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(session: SessionToken, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            session,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn message(session: SessionToken, entry: &ConversationEntry) -> Self {
        Self::new(
            session,
            EventKind::Message {
                role: entry.role,
                content: entry.text.clone(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_tokens_are_distinct() {
        assert_ne!(SessionToken::new(), SessionToken::new());
    }

    #[test]
    fn identity_accepts_user_id_alias() {
        let identity: Identity = serde_json::from_str(
            r#"{"user_id": "user_001", "name": "Maria Papadopoulou", "email": "maria@example.com"}"#,
        )
        .unwrap();
        assert_eq!(identity.id, "user_001");
        assert_eq!(identity.name, "Maria Papadopoulou");
    }

    #[test]
    fn event_kind_serializes_with_tag() {
        let kind = EventKind::ToolDenied {
            request: "r1".into(),
            name: "book_flight".into(),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "tool_denied");
        assert_eq!(kind.name(), "tool_denied");
    }
}
