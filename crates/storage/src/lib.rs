//! Conversation records and per-session history storage.
//!
//! This crate owns the data that outlives a single turn: the messages of a
//! conversation and the append-only logs they are persisted to.
//!
//! # Core Concepts
//!
//! ## Message
//!
//! A [`Message`] has a [`Role`] (system, user, assistant or tool) and text
//! content. Assistant messages may carry [`ToolCallRequest`]s; tool messages
//! carry the name of the tool that produced them.
//!
//! ## SessionId
//!
//! A [`SessionId`] is the stable key of one history, usually a persona name
//! such as `jandro`. Keys are lowercased and restricted to `[a-z0-9_-]` so
//! they are safe to use as file names.
//!
//! ## HistoryStore
//!
//! The [`HistoryStore`] trait appends, loads and replaces histories. A
//! replacement (used by summarization) always writes a [`Backup`] first, so
//! no history is ever discarded irrecoverably. Two backends are provided:
//!
//! - [`FileHistoryStore`]: one JSON-lines file per session, backups are
//!   timestamped copies next to it.
//! - [`SqliteHistoryStore`]: a single SQLite database, backups are rows in
//!   an archive table.
//!
//! # Example
//!
//! ```no_run
//! use storage::{FileHistoryStore, HistoryStore, Message, SessionId};
//!
//! let store = FileHistoryStore::new("historial");
//! let session = SessionId::parse("jandro")?;
//!
//! store.append_all(&session, &[
//!     Message::user("Hola"),
//!     Message::assistant("¡Hola! ¿En qué te ayudo?"),
//! ])?;
//!
//! for message in store.load(&session)? {
//!     println!("{}: {}", message.role, message.content);
//! }
//! # Ok::<(), storage::Error>(())
//! ```

mod error;
mod file;
mod message;
mod session;
mod sqlite;
mod store;

pub use error::{Error, Result};
pub use file::FileHistoryStore;
pub use message::{Message, Role, ToolCallRequest};
pub use session::SessionId;
pub use sqlite::SqliteHistoryStore;
pub use store::{Backup, HistoryStore, SessionSummary};
