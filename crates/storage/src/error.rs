use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no history found for session {0}")]
    NotFound(String),

    #[error("invalid session id '{0}': use 1-64 characters from [a-z0-9_-]")]
    InvalidSessionId(String),
}

pub type Result<T> = std::result::Result<T, Error>;
