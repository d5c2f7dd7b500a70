//! Background audit writer.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::{Event, EventStore};

enum Command {
    Append(Event),
    Flush(oneshot::Sender<()>),
}

/// Appends events to an [`EventStore`] from a blocking worker, in the order
/// they were recorded, so SQLite writes never run on an async worker thread.
///
/// The worker exits once every handle is dropped.
#[derive(Clone)]
pub struct AuditLog {
    tx: mpsc::UnboundedSender<Command>,
}

impl AuditLog {
    /// Start the writer. Must be called from within a Tokio runtime.
    pub fn spawn(store: Arc<EventStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::task::spawn_blocking(move || {
            while let Some(command) = rx.blocking_recv() {
                match command {
                    Command::Append(event) => {
                        if let Err(e) = store.append(&event) {
                            tracing::warn!(
                                session = %event.session,
                                kind = event.kind.name(),
                                error = %e,
                                "audit write failed"
                            );
                        }
                    }
                    Command::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });
        Self { tx }
    }

    /// Queue an event for writing.
    pub fn record(&self, event: Event) {
        if let Err(mpsc::error::SendError(Command::Append(event))) =
            self.tx.send(Command::Append(event))
        {
            tracing::warn!(session = %event.session, kind = event.kind.name(), "audit writer stopped");
        }
    }

    /// Wait until every event recorded so far has been written.
    pub async fn flush(&self) {
        let (done, written) = oneshot::channel();
        if self.tx.send(Command::Flush(done)).is_ok() {
            let _ = written.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConversationEntry, EventKind, SessionToken};

    #[tokio::test]
    async fn writes_in_recorded_order() {
        let store = Arc::new(EventStore::in_memory().unwrap());
        let audit = AuditLog::spawn(store.clone());
        let token = SessionToken::from("ordered");

        audit.record(Event::message(token.clone(), &ConversationEntry::user("first")));
        audit.record(Event::new(
            token.clone(),
            EventKind::ToolDenied {
                request: "r1".into(),
                name: "book_flight".into(),
            },
        ));
        audit.record(Event::message(token.clone(), &ConversationEntry::assistant("last")));
        audit.flush().await;

        let names: Vec<_> = store
            .load_events(&token, None)
            .unwrap()
            .iter()
            .map(|e| e.kind.name())
            .collect();
        assert_eq!(names, ["message", "tool_denied", "message"]);
    }
}
