//! JSON-lines history files, one per session.

use crate::{Backup, Error, HistoryStore, Message, Result, SessionId, SessionSummary};
use chrono::{DateTime, Local, Utc};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const EXTENSION: &str = "jsonl";

/// History store writing `<dir>/<session>.jsonl`, one serialized message per line.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    dir: PathBuf,
}

impl FileHistoryStore {
    /// Use `dir` as the history directory. It is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the log file for a session.
    pub fn session_path(&self, session: &SessionId) -> PathBuf {
        self.dir.join(format!("{session}.{EXTENSION}"))
    }

    fn encode(messages: &[Message]) -> Result<String> {
        let mut buf = String::new();
        for message in messages {
            buf.push_str(&serde_json::to_string(message)?);
            buf.push('\n');
        }
        Ok(buf)
    }

    fn backup_path(path: &Path) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let base = format!("{}.{stamp}", path.display());
        let mut candidate = PathBuf::from(&base);
        let mut n = 1;
        while candidate.exists() {
            candidate = PathBuf::from(format!("{base}_{n}"));
            n += 1;
        }
        candidate
    }
}

impl HistoryStore for FileHistoryStore {
    fn append(&self, session: &SessionId, message: &Message) -> Result<()> {
        self.append_all(session, std::slice::from_ref(message))
    }

    fn append_all(&self, session: &SessionId, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;
        // One write per increment keeps a turn together in the file.
        let buf = Self::encode(messages)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.session_path(session))?;
        file.write_all(buf.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn load(&self, session: &SessionId) -> Result<Vec<Message>> {
        let path = self.session_path(session);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut messages = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(&line) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    "skipping malformed history line: {e}"
                ),
            }
        }
        Ok(messages)
    }

    fn replace(&self, session: &SessionId, messages: &[Message]) -> Result<Backup> {
        let path = self.session_path(session);
        if !path.exists() {
            return Err(Error::NotFound(session.to_string()));
        }

        let backup = Self::backup_path(&path);
        fs::copy(&path, &backup)?;
        debug!(backup = %backup.display(), "history backed up");

        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        fs::write(&tmp, Self::encode(messages)?)?;
        fs::rename(&tmp, &path)?;

        Ok(Backup::File(backup))
    }

    fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| SessionId::parse(s).ok())
            else {
                continue;
            };
            let message_count = self.load(&id)?.len();
            let last_activity = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);
            sessions.push(SessionSummary {
                id,
                message_count,
                last_activity,
            });
        }

        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(sessions)
    }
}
