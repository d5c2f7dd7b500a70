use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use storage::{ConversationEntry, Identity, SessionToken};
use tokio::time::Instant;
use uuid::Uuid;

/// Tool arguments: an ordered key-value mapping, validated only by the
/// provider that owns the tool.
pub type Arguments = Map<String, Value>;

/// Identifies one pending proposal. Distinct from the session token; a fresh
/// one is minted for every proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestToken(pub Uuid);

impl RequestToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RequestToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// A tool call suggested by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolProposal {
    pub tool: String,
    #[serde(default)]
    pub args: Arguments,
}

impl ToolProposal {
    pub fn new(tool: impl Into<String>, args: Arguments) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

/// A proposal awaiting a human decision, with everything needed to execute
/// it later.
#[derive(Debug, Clone)]
pub struct PendingProposal {
    pub proposal: ToolProposal,
    /// The utterance that produced the proposal.
    pub query: String,
    pub session: SessionToken,
    /// Conversation context as it was when the proposal was made.
    pub context: Vec<ConversationEntry>,
    pub identity: Option<Identity>,
    pub created_at: Instant,
}

impl PendingProposal {
    pub fn new(proposal: ToolProposal, query: impl Into<String>, session: SessionToken) -> Self {
        Self {
            proposal,
            query: query.into(),
            session,
            context: Vec::new(),
            identity: None,
            created_at: Instant::now(),
        }
    }

    pub fn with_context(mut self, context: Vec<ConversationEntry>) -> Self {
        self.context = context;
        self
    }

    pub fn with_identity(mut self, identity: Option<Identity>) -> Self {
        self.identity = identity;
        self
    }
}
