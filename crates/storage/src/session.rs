//! Session identifiers.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_LEN: usize = 64;

/// Stable key of one conversation history, usually a persona name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Parse a user-supplied key. Keys are case-insensitive and stored lowercased.
    pub fn parse(raw: &str) -> Result<Self> {
        let key = raw.trim().to_lowercase();
        let valid = !key.is_empty()
            && key.len() <= MAX_LEN
            && key
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if valid {
            Ok(Self(key))
        } else {
            Err(Error::InvalidSessionId(raw.to_string()))
        }
    }

    /// A fresh key for an anonymous session.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Speaker label used in transcripts: the key with its first letter uppercased.
    pub fn display_name(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl std::str::FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
