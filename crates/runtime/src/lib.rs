//! Charla runtime: model backends, tools and the conversation loop.
//!
//! This crate provides the core runtime for tool-augmented conversations
//! with a local model: the model protocol and its Ollama adapter, the tool
//! registry, and the two-step orchestration loop that ties them together.
//!
//! # Overview
//!
//! - **Backend**: a trait abstracting model runtimes ([`OllamaBackend`]).
//! - **ToolRegistry**: named tools with typed arguments, coerced and
//!   dispatched by name. Failures come back as `ERROR:` text, never as
//!   panics past the registry.
//! - **RelevanceFilter**: keyword rules deciding which tools a given
//!   utterance is offered.
//! - **Conversation**: runs one user turn through the model, the requested
//!   tools and a final tool-less model call, then persists the turn.
//!
//! # Example
//!
//! ```ignore
//! use runtime::{Conversation, ConversationConfig, OllamaBackend, ToolRegistry};
//! use std::sync::Arc;
//!
//! # async fn example() -> runtime::Result<()> {
//! let backend = OllamaBackend::builder().model("llama3.1:8b").build();
//! let registry = Arc::new(ToolRegistry::new());
//!
//! let mut conversation = Conversation::new(backend, registry, ConversationConfig::default());
//! let outcome = conversation.turn("¡Hola!").await?;
//! println!("{}", outcome.answer);
//! # Ok(())
//! # }
//! ```

mod conversation;
mod error;
pub mod model;
mod persona;
pub mod providers;
mod summarize;
pub mod tools;

#[cfg(test)]
mod testing;

pub use conversation::{
    Conversation, ConversationConfig, DEFAULT_FOLLOWUP_TEMPERATURE, ToolInvocation, TurnOutcome,
    TurnState,
};
pub use error::{Error, Result};
pub use model::{Backend, ModelError, ModelRequest, ModelResponse, Usage};
pub use persona::PersonaProfile;
pub use providers::{HealthStatus, OllamaBackend, OllamaBackendBuilder};
pub use summarize::{SUMMARY_MARKER, SummaryOutcome, summarize, transcript};
pub use tools::{
    ParamKind, ParamSpec, RangePolicy, RelevanceFilter, Tool, ToolError, ToolFailure,
    ToolRegistry, ToolResult, ToolSchema,
};
