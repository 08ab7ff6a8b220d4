use runtime::ToolFailure;
use thiserror::Error;

/// Failure talking to an external data service.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{service} timed out after {seconds}s")]
    Timeout { service: &'static str, seconds: u64 },

    #[error("{service} unreachable: {message}")]
    Network {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },

    #[error("{service} sent an unexpected response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
}

impl From<SourceError> for ToolFailure {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Timeout { seconds, .. } => ToolFailure::Timeout(seconds),
            SourceError::Decode { .. } => ToolFailure::Execution(e.to_string()),
            SourceError::Network { .. } | SourceError::Status { .. } => {
                ToolFailure::Unavailable(e.to_string())
            }
        }
    }
}

/// A tool catalog that cannot be built.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown tool in configuration: {0}")]
    UnknownTool(String),

    #[error("unknown timezone in configuration: {0}")]
    InvalidTimezone(String),

    #[error("{0} forecasts need an API key")]
    MissingApiKey(&'static str),

    #[error(transparent)]
    Registry(#[from] runtime::ToolError),
}
