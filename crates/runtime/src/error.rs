use crate::model::ModelError;
use crate::tools::ToolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("empty input")]
    EmptyInput,

    #[error("model call failed: {0}")]
    Model(#[from] ModelError),

    /// The second model call failed after tools ran.
    #[error("follow-up model call failed: {0}")]
    FollowUp(#[source] ModelError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Storage(#[from] storage::Error),

    /// The turn completed but could not be written to the history store.
    #[error("answer produced but not persisted: {source}")]
    Persist {
        answer: String,
        #[source]
        source: storage::Error,
    },

    #[error("nothing to summarize for session {0}")]
    NothingToSummarize(String),

    #[error("invalid persona profile: {0}")]
    Persona(String),
}

pub type Result<T> = std::result::Result<T, Error>;
