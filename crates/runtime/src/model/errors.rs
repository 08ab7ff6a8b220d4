use thiserror::Error;

/// Errors from model runtime calls.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The model runtime could not be reached.
    #[error("network: {0}")]
    Network(String),

    /// The call did not complete within the configured timeout.
    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The model runtime returned an error response.
    #[error("model api: {0}")]
    Api(String),

    /// The response could not be parsed.
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}
