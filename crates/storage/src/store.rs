//! The history store abstraction.

use crate::{Message, Result, SessionId};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use uuid::Uuid;

/// Summary of one stored session, for listings.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: SessionId,
    pub message_count: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Where a pre-replacement copy of a history was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backup {
    /// A timestamped copy of the session log file.
    File(PathBuf),
    /// Rows copied into the archive table.
    Archive { archive_id: Uuid, messages: usize },
}

impl std::fmt::Display for Backup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Archive {
                archive_id,
                messages,
            } => write!(f, "archive {archive_id} ({messages} messages)"),
        }
    }
}

/// Append-only, per-session conversation log.
///
/// Histories are never deleted. [`HistoryStore::replace`] is the only way to
/// shrink one, and it always keeps a backup of what it overwrote.
pub trait HistoryStore: Send {
    /// Append one message to a session.
    fn append(&self, session: &SessionId, message: &Message) -> Result<()>;

    /// Append the messages of one turn, in order.
    fn append_all(&self, session: &SessionId, messages: &[Message]) -> Result<()> {
        for message in messages {
            self.append(session, message)?;
        }
        Ok(())
    }

    /// Load a session's messages in insertion order. Unknown sessions are empty.
    fn load(&self, session: &SessionId) -> Result<Vec<Message>>;

    /// Back up the current history, then replace it wholesale.
    ///
    /// Fails with [`crate::Error::NotFound`] when the session has no history.
    fn replace(&self, session: &SessionId, messages: &[Message]) -> Result<Backup>;

    /// List stored sessions, most recently active first.
    fn list_sessions(&self) -> Result<Vec<SessionSummary>>;
}

impl<S: HistoryStore + ?Sized> HistoryStore for Box<S> {
    fn append(&self, session: &SessionId, message: &Message) -> Result<()> {
        (**self).append(session, message)
    }

    fn append_all(&self, session: &SessionId, messages: &[Message]) -> Result<()> {
        (**self).append_all(session, messages)
    }

    fn load(&self, session: &SessionId) -> Result<Vec<Message>> {
        (**self).load(session)
    }

    fn replace(&self, session: &SessionId, messages: &[Message]) -> Result<Backup> {
        (**self).replace(session, messages)
    }

    fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        (**self).list_sessions()
    }
}
