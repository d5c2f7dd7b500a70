//! SQLite audit log.

use crate::{Error, Event, EventKind, Result, SessionToken};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed, append-only event store.
///
/// The connection sits behind a mutex so the store can be shared between
/// concurrently running requests.
pub struct EventStore {
    conn: Mutex<Connection>,
}

/// Aggregate view of one session in the audit log.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session: SessionToken,
    pub first_at: DateTime<Utc>,
    pub last_at: DateTime<Utc>,
    pub message_count: u64,
    pub tool_call_count: u64,
}

impl EventStore {
    /// Open or create an event store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Create an in-memory event store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_session
                ON events(session_id, seq);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an event to the store.
    pub fn append(&self, event: &Event) -> Result<()> {
        self.conn().execute(
            "INSERT INTO events (id, session_id, timestamp, kind, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id.to_string(),
                event.session.as_str(),
                event.timestamp.to_rfc3339(),
                event.kind.name(),
                serde_json::to_string(&event.kind)?,
            ],
        )?;
        Ok(())
    }

    /// Load a session's events in append order, optionally filtered by kind
    /// name (`message`, `tool_proposed`, ...).
    pub fn load_events(&self, session: &SessionToken, kind: Option<&str>) -> Result<Vec<Event>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, data FROM events
             WHERE session_id = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY seq",
        )?;

        let rows = stmt
            .query_map(params![session.as_str(), kind], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, timestamp, data)| {
                Ok(Event {
                    id: id.parse().map_err(|e| corrupt(&id, e))?,
                    session: session.clone(),
                    timestamp: parse_timestamp(&id, &timestamp)?,
                    kind: serde_json::from_str::<EventKind>(&data)?,
                })
            })
            .collect()
    }

    /// Summarize every session, most recently active first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT session_id, MIN(timestamp), MAX(timestamp),
                    SUM(kind = 'message'), SUM(kind = 'tool_proposed')
             FROM events GROUP BY session_id ORDER BY MAX(seq) DESC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(session, first, last, messages, tools)| {
                Ok(SessionSummary {
                    first_at: parse_timestamp(&session, &first)?,
                    last_at: parse_timestamp(&session, &last)?,
                    session: SessionToken::from(session),
                    message_count: messages.max(0) as u64,
                    tool_call_count: tools.max(0) as u64,
                })
            })
            .collect()
    }

    /// Sessions whose token starts with `prefix`.
    pub fn matching_sessions(&self, prefix: &str) -> Result<Vec<SessionToken>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT session_id FROM events WHERE session_id LIKE ?1 || '%' ORDER BY session_id",
        )?;
        let tokens = stmt
            .query_map([prefix], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tokens.into_iter().map(SessionToken::from).collect())
    }
}

fn parse_timestamp(id: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(id, e))
}

fn corrupt(id: &str, reason: impl std::fmt::Display) -> Error {
    Error::Corrupt {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}
