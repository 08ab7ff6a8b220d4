//! SQLite history store.

use crate::{Backup, Error, HistoryStore, Message, Result, SessionId, SessionSummary};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tracing::warn;
use uuid::Uuid;

/// SQLite-backed history store.
pub struct SqliteHistoryStore {
    conn: Connection,
}

impl SqliteHistoryStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                role TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_session
                ON messages(session_id, seq);

            CREATE TABLE IF NOT EXISTS archived_messages (
                archive_id TEXT NOT NULL,
                archived_at TEXT NOT NULL,
                session_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                role TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_archived_session
                ON archived_messages(session_id, archived_at);
            "#,
        )?;
        Ok(())
    }

    fn next_seq(conn: &Connection, session: &SessionId) -> Result<i64> {
        let max: Option<i64> = conn
            .query_row(
                "SELECT MAX(seq) FROM messages WHERE session_id = ?1",
                [session.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(max.map_or(0, |m| m + 1))
    }

    fn insert(conn: &Connection, session: &SessionId, seq: i64, message: &Message) -> Result<()> {
        conn.execute(
            "INSERT INTO messages (id, session_id, seq, timestamp, role, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                Uuid::new_v4().to_string(),
                session.as_str(),
                seq,
                Utc::now().to_rfc3339(),
                message.role.as_str(),
                serde_json::to_string(message)?,
            ],
        )?;
        Ok(())
    }

    fn count(&self, session: &SessionId) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
            [session.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(n).unwrap_or_default())
    }

    /// Load the messages archived by one `replace` call.
    pub fn load_archive(&self, archive_id: Uuid) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT data FROM archived_messages WHERE archive_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map([archive_id.to_string()], |row| row.get::<_, String>(0))?;
        let mut messages = Vec::new();
        for data in rows {
            messages.push(serde_json::from_str(&data?)?);
        }
        Ok(messages)
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn append(&self, session: &SessionId, message: &Message) -> Result<()> {
        self.append_all(session, std::slice::from_ref(message))
    }

    fn append_all(&self, session: &SessionId, messages: &[Message]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let mut seq = Self::next_seq(&tx, session)?;
        for message in messages {
            Self::insert(&tx, session, seq, message)?;
            seq += 1;
        }
        tx.commit()?;
        Ok(())
    }

    fn load(&self, session: &SessionId) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, data FROM messages WHERE session_id = ?1 ORDER BY seq",
        )?;

        let rows = stmt.query_map([session.as_str()], |row| {
            let seq: i64 = row.get(0)?;
            let data: String = row.get(1)?;
            Ok((seq, data))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (seq, data) = row?;
            match serde_json::from_str(&data) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(session = %session, seq, "skipping undecodable message: {e}"),
            }
        }
        Ok(messages)
    }

    fn replace(&self, session: &SessionId, messages: &[Message]) -> Result<Backup> {
        let existing = self.count(session)?;
        if existing == 0 {
            return Err(Error::NotFound(session.to_string()));
        }

        let archive_id = Uuid::new_v4();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO archived_messages
                (archive_id, archived_at, session_id, seq, timestamp, role, data)
             SELECT ?1, ?2, session_id, seq, timestamp, role, data
             FROM messages WHERE session_id = ?3",
            params![
                archive_id.to_string(),
                Utc::now().to_rfc3339(),
                session.as_str()
            ],
        )?;
        tx.execute(
            "DELETE FROM messages WHERE session_id = ?1",
            [session.as_str()],
        )?;
        for (seq, message) in (0_i64..).zip(messages) {
            Self::insert(&tx, session, seq, message)?;
        }
        tx.commit()?;

        Ok(Backup::Archive {
            archive_id,
            messages: existing,
        })
    }

    fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, COUNT(*), MAX(timestamp) FROM messages
             GROUP BY session_id ORDER BY MAX(timestamp) DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            let last: Option<String> = row.get(2)?;
            Ok((id, count, last))
        })?;

        let sessions = rows
            .filter_map(|r| r.ok())
            .filter_map(|(id, count, last)| {
                Some(SessionSummary {
                    id: SessionId::parse(&id).ok()?,
                    message_count: usize::try_from(count).ok()?,
                    last_activity: last
                        .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
                        .map(|t| t.with_timezone(&Utc)),
                })
            })
            .collect();

        Ok(sessions)
    }
}
