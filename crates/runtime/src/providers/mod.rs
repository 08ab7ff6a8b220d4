//! Model runtime adapters.
//!
//! Each provider implements [`crate::Backend`] for its specific API.

mod ollama;

pub use ollama::{
    DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT, HealthStatus, OllamaBackend,
    OllamaBackendBuilder,
};
