//! Per-user conversation state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::audit::AuditLog;
use crate::{ConversationEntry, Event, EventKind, EventStore, Identity, SessionToken};

/// One end user's conversation: ordered entries plus last-known identity.
#[derive(Debug, Clone, Default)]
pub struct UserSession {
    entries: Vec<ConversationEntry>,
    identity: Option<Identity>,
}

impl UserSession {
    /// The full, ordered history.
    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    /// The last `max` entries, oldest first.
    pub fn recent(&self, max: usize) -> &[ConversationEntry] {
        let start = self.entries.len().saturating_sub(max);
        &self.entries[start..]
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }
}

/// Exclusive access to one session for the duration of a request.
///
/// Appends made through the guard are mirrored to the audit log.
pub struct SessionGuard {
    token: SessionToken,
    session: OwnedMutexGuard<UserSession>,
    audit: Option<AuditLog>,
}

impl SessionGuard {
    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// Append an entry. Identical entries are stored twice.
    pub fn append(&mut self, entry: ConversationEntry) {
        record(&self.audit, Event::message(self.token.clone(), &entry));
        self.session.entries.push(entry);
    }

    pub fn recent(&self, max: usize) -> Vec<ConversationEntry> {
        self.session.recent(max).to_vec()
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        self.session.entries()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.identity()
    }

    /// Attach or replace the session's identity.
    pub fn set_identity(&mut self, identity: Identity) {
        self.session.identity = Some(identity);
    }
}

/// All user sessions, keyed by token.
///
/// Each session sits behind its own fair mutex: requests for the same token
/// are serialized in arrival order while different tokens proceed
/// independently.
#[derive(Default)]
pub struct ConversationStore {
    sessions: RwLock<HashMap<SessionToken, Arc<Mutex<UserSession>>>>,
    audit: Option<AuditLog>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror every append and recorded event into `audit`.
    ///
    /// Writes happen on a background worker; see [`flush_audit`](Self::flush_audit).
    /// Must be called from within a Tokio runtime.
    pub fn with_audit(audit: Arc<EventStore>) -> Self {
        Self {
            sessions: RwLock::default(),
            audit: Some(AuditLog::spawn(audit)),
        }
    }

    /// Lock a session, creating it if it does not exist yet.
    pub async fn lock(&self, token: &SessionToken) -> SessionGuard {
        let session = self.session(token).await;
        SessionGuard {
            token: token.clone(),
            session: session.lock_owned().await,
            audit: self.audit.clone(),
        }
    }

    pub async fn append(&self, token: &SessionToken, entry: ConversationEntry) {
        self.lock(token).await.append(entry);
    }

    /// The last `max` entries of a session, oldest first. Unknown sessions
    /// are empty.
    pub async fn recent(&self, token: &SessionToken, max: usize) -> Vec<ConversationEntry> {
        match self.existing(token).await {
            Some(session) => session.lock().await.recent(max).to_vec(),
            None => Vec::new(),
        }
    }

    /// The full history of a session.
    pub async fn history(&self, token: &SessionToken) -> Vec<ConversationEntry> {
        match self.existing(token).await {
            Some(session) => session.lock().await.entries().to_vec(),
            None => Vec::new(),
        }
    }

    pub async fn set_identity(&self, token: &SessionToken, identity: Identity) {
        self.lock(token).await.set_identity(identity);
    }

    pub async fn identity(&self, token: &SessionToken) -> Option<Identity> {
        let session = self.existing(token).await?;
        let session = session.lock().await;
        session.identity().cloned()
    }

    /// Write a non-message event to the audit log, if one is attached.
    pub fn record(&self, token: &SessionToken, kind: EventKind) {
        record(&self.audit, Event::new(token.clone(), kind));
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Wait until every audit event recorded so far has been written.
    pub async fn flush_audit(&self) {
        if let Some(audit) = &self.audit {
            audit.flush().await;
        }
    }

    async fn existing(&self, token: &SessionToken) -> Option<Arc<Mutex<UserSession>>> {
        self.sessions.read().await.get(token).cloned()
    }

    async fn session(&self, token: &SessionToken) -> Arc<Mutex<UserSession>> {
        if let Some(session) = self.existing(token).await {
            return session;
        }
        let mut sessions = self.sessions.write().await;
        sessions.entry(token.clone()).or_default().clone()
    }
}

fn record(audit: &Option<AuditLog>, event: Event) {
    if let Some(audit) = audit {
        audit.record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use std::time::Duration;

    fn identity() -> Identity {
        Identity {
            id: "user_001".into(),
            name: "Maria Papadopoulou".into(),
            email: "maria@example.com".into(),
        }
    }

    #[tokio::test]
    async fn append_does_not_deduplicate() {
        let store = ConversationStore::new();
        let token = SessionToken::new();
        store.append(&token, ConversationEntry::user("hello")).await;
        store.append(&token, ConversationEntry::user("hello")).await;

        let history = store.history(&token).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], history[1]);
    }

    #[tokio::test]
    async fn recent_is_an_oldest_first_window() {
        let store = ConversationStore::new();
        let token = SessionToken::new();
        for i in 0..8 {
            store
                .append(&token, ConversationEntry::user(format!("m{i}")))
                .await;
        }

        let recent = store.recent(&token, 6).await;
        let texts: Vec<_> = recent.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, ["m2", "m3", "m4", "m5", "m6", "m7"]);
        assert_eq!(store.history(&token).await.len(), 8);
    }

    #[tokio::test]
    async fn unknown_session_is_empty() {
        let store = ConversationStore::new();
        let token = SessionToken::new();
        assert!(store.recent(&token, 6).await.is_empty());
        assert!(store.identity(&token).await.is_none());
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = ConversationStore::new();
        let a = SessionToken::new();
        let b = SessionToken::new();
        store.append(&a, ConversationEntry::user("from a")).await;
        store.set_identity(&a, identity()).await;

        assert!(store.history(&b).await.is_empty());
        assert!(store.identity(&b).await.is_none());
        assert_eq!(store.identity(&a).await, Some(identity()));
    }

    #[tokio::test]
    async fn appends_mirror_into_audit_log() {
        let audit = Arc::new(EventStore::in_memory().unwrap());
        let store = ConversationStore::with_audit(audit.clone());
        let token = SessionToken::from("audited");

        store.append(&token, ConversationEntry::user("show my bookings")).await;
        store.record(
            &token,
            EventKind::ToolResult {
                name: "get_user_bookings".into(),
                output: "none".into(),
            },
        );
        store.flush_audit().await;

        let events = audit.load_events(&token, None).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0].kind,
            EventKind::Message { role: Role::User, .. }
        ));
    }

    #[tokio::test]
    async fn same_session_requests_are_serialized_in_arrival_order() {
        let store = Arc::new(ConversationStore::new());
        let token = SessionToken::new();

        let mut first = store.lock(&token).await;

        let second = {
            let store = store.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let mut guard = store.lock(&token).await;
                guard.append(ConversationEntry::user("second"));
            })
        };

        // The second request is parked on the session lock.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!second.is_finished());

        first.append(ConversationEntry::user("first"));
        drop(first);
        second.await.unwrap();

        let texts: Vec<_> = store
            .history(&token)
            .await
            .into_iter()
            .map(|e| e.text)
            .collect();
        assert_eq!(texts, ["first", "second"]);
    }
}
