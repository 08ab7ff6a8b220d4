//! CLI error types.

use crate::config::ConfigError;
use thiserror::Error;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration could not be read or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Command-line arguments that clap cannot check, such as `--args` JSON.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// A tool ran and reported an error.
    #[error("{0}")]
    ToolFailed(String),

    /// One or more `doctor` checks did not pass.
    #[error("{0} check(s) failed")]
    Unhealthy(usize),

    /// An error occurred in the runtime layer.
    #[error(transparent)]
    Runtime(#[from] runtime::Error),

    #[error(transparent)]
    Tool(#[from] runtime::ToolError),

    /// An error occurred in the storage layer.
    #[error(transparent)]
    Storage(#[from] storage::Error),

    /// The tool catalog could not be built from the configuration.
    #[error(transparent)]
    Catalog(#[from] capabilities::CatalogError),

    #[error(transparent)]
    Mcp(#[from] mcp::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
