use super::ParamKind;
use thiserror::Error;

/// Registry-level errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("tool already registered: {0}")]
    DuplicateTool(String),
    #[error("tool not found: {0}")]
    UnknownTool(String),
    #[error("invalid schema for tool {tool}: {reason}")]
    InvalidSchema { tool: String, reason: String },
}

/// Arguments that could not be coerced to a tool's schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgumentError {
    #[error("missing required argument '{0}'")]
    Missing(String),
    #[error("argument '{param}' must be {expected}, got {got}")]
    Invalid {
        param: String,
        expected: ParamKind,
        got: String,
    },
    #[error("argument '{param}' is {value}, outside the allowed range {min}..={max}")]
    OutOfRange {
        param: String,
        value: i64,
        min: i64,
        max: i64,
    },
    #[error("arguments must be a JSON object, got {0}")]
    NotAnObject(String),
}

impl ArgumentError {
    /// Name of the offending parameter, when there is one.
    pub fn param(&self) -> Option<&str> {
        match self {
            Self::Missing(param)
            | Self::Invalid { param, .. }
            | Self::OutOfRange { param, .. } => Some(param),
            Self::NotAnObject(_) => None,
        }
    }
}

/// Failure reported by a tool handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolFailure {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error("{0}")]
    Execution(String),
}
