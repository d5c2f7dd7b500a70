//! The authorization gate.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::{Error, PendingProposal, RequestToken, Result};

/// Outcome of resolving a pending proposal. Both states are terminal.
#[derive(Debug, Clone)]
pub enum Resolution {
    Approved(PendingProposal),
    Denied(PendingProposal),
}

impl Resolution {
    pub fn proposal(&self) -> &PendingProposal {
        match self {
            Resolution::Approved(p) | Resolution::Denied(p) => p,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Resolution::Approved(_))
    }
}

/// Holds proposals until a human approves or denies them.
///
/// Every token resolves at most once: resolving removes the proposal, so a
/// replayed or forged token fails with [`Error::UnknownToken`].
pub struct Gate {
    pending: Mutex<HashMap<RequestToken, PendingProposal>>,
    ttl: Option<Duration>,
}

impl Gate {
    /// A gate whose proposals never expire.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ttl: None,
        }
    }

    /// A gate that discards proposals left unanswered for longer than `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    /// Store a proposal under a freshly minted token.
    pub async fn submit(&self, proposal: PendingProposal) -> RequestToken {
        let token = RequestToken::new();
        self.propose(token, proposal).await;
        token
    }

    /// Store a proposal under `token`, replacing any proposal already held
    /// for it. Expired proposals are pruned first.
    pub async fn propose(&self, token: RequestToken, proposal: PendingProposal) {
        let mut pending = self.pending.lock().await;
        self.prune(&mut pending);
        tracing::debug!(request = %token, tool = %proposal.proposal.tool, "proposal pending");
        pending.insert(token, proposal);
    }

    /// Consume the proposal held for `token`.
    pub async fn resolve(&self, token: RequestToken, approved: bool) -> Result<Resolution> {
        let proposal = self
            .pending
            .lock()
            .await
            .remove(&token)
            .ok_or(Error::UnknownToken(token))?;

        if self.is_expired(&proposal) {
            tracing::debug!(request = %token, "resolve on expired proposal");
            return Err(Error::Expired(token));
        }

        tracing::debug!(request = %token, tool = %proposal.proposal.tool, approved, "proposal resolved");
        Ok(if approved {
            Resolution::Approved(proposal)
        } else {
            Resolution::Denied(proposal)
        })
    }

    /// Whether a proposal is currently held for `token`.
    pub async fn contains(&self, token: RequestToken) -> bool {
        self.pending.lock().await.contains_key(&token)
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Drop every pending proposal, returning how many were discarded.
    pub async fn clear(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let dropped = pending.len();
        pending.clear();
        dropped
    }

    fn is_expired(&self, proposal: &PendingProposal) -> bool {
        self.ttl
            .is_some_and(|ttl| proposal.created_at.elapsed() > ttl)
    }

    fn prune(&self, pending: &mut HashMap<RequestToken, PendingProposal>) {
        let before = pending.len();
        pending.retain(|_, p| !self.is_expired(p));
        let pruned = before - pending.len();
        if pruned > 0 {
            tracing::info!(pruned, "discarded expired proposals");
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Arguments, ToolProposal};
    use serde_json::json;
    use storage::SessionToken;

    fn pending(tool: &str, args: serde_json::Value) -> PendingProposal {
        let args: Arguments = serde_json::from_value(args).unwrap();
        PendingProposal::new(ToolProposal::new(tool, args), "query", SessionToken::new())
    }

    #[tokio::test]
    async fn approve_round_trips_the_proposal() {
        let gate = Gate::new();
        let proposal = pending(
            "search_flights",
            json!({"origin": "ATH", "destination": "BCN", "date": "2025-12-03"}),
        );
        let expected = proposal.proposal.clone();

        let token = gate.submit(proposal).await;
        let resolution = gate.resolve(token, true).await.unwrap();

        assert!(resolution.is_approved());
        assert_eq!(resolution.proposal().proposal, expected);
        assert_eq!(gate.pending_count().await, 0);
    }

    #[tokio::test]
    async fn deny_is_terminal() {
        let gate = Gate::new();
        let token = gate.submit(pending("book_flight", json!({}))).await;

        let resolution = gate.resolve(token, false).await.unwrap();
        assert!(matches!(resolution, Resolution::Denied(_)));
        assert!(!gate.contains(token).await);
    }

    #[tokio::test]
    async fn second_resolve_fails() {
        let gate = Gate::new();
        for approved in [true, false] {
            let token = gate.submit(pending("get_booking_details", json!({}))).await;
            gate.resolve(token, approved).await.unwrap();
            assert_eq!(
                gate.resolve(token, approved).await.unwrap_err(),
                Error::UnknownToken(token)
            );
        }
    }

    #[tokio::test]
    async fn forged_token_fails() {
        let gate = Gate::new();
        let forged = RequestToken::new();
        assert_eq!(
            gate.resolve(forged, true).await.unwrap_err(),
            Error::UnknownToken(forged)
        );
    }

    #[tokio::test]
    async fn propose_overwrites_same_token() {
        let gate = Gate::new();
        let token = RequestToken::new();
        gate.propose(token, pending("search_flights", json!({}))).await;
        gate.propose(token, pending("book_flight", json!({}))).await;

        assert_eq!(gate.pending_count().await, 1);
        let resolution = gate.resolve(token, true).await.unwrap();
        assert_eq!(resolution.proposal().proposal.tool, "book_flight");
    }

    #[tokio::test]
    async fn resolving_one_token_leaves_others_pending() {
        let gate = Gate::new();
        let first = gate.submit(pending("search_flights", json!({}))).await;
        let second = gate.submit(pending("book_flight", json!({}))).await;
        assert_ne!(first, second);

        gate.resolve(second, true).await.unwrap();
        assert!(gate.contains(first).await);
        assert_eq!(gate.pending_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_proposals_are_rejected_and_pruned() {
        let gate = Gate::with_ttl(Duration::from_secs(60));
        let stale = gate.submit(pending("book_flight", json!({}))).await;
        let old = gate.submit(pending("search_flights", json!({}))).await;

        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(
            gate.resolve(stale, true).await.unwrap_err(),
            Error::Expired(stale)
        );

        let fresh = gate.submit(pending("get_user_bookings", json!({}))).await;
        assert!(!gate.contains(old).await);
        assert!(gate.contains(fresh).await);
        assert!(gate.resolve(fresh, true).await.is_ok());
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let gate = Gate::new();
        gate.submit(pending("a", json!({}))).await;
        gate.submit(pending("b", json!({}))).await;
        assert_eq!(gate.clear().await, 2);
        assert_eq!(gate.pending_count().await, 0);
    }
}
