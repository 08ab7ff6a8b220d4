//! MCP (Model Context Protocol) server library.
//!
//! This crate exposes a [`runtime::ToolRegistry`] to MCP clients over
//! newline-delimited JSON-RPC 2.0 on stdio. Tool calls are dispatched
//! through the registry, so argument coercion and error reporting behave
//! exactly as they do inside a conversation.
//!
//! # Example
//!
//! ```no_run
//! use runtime::ToolRegistry;
//! use std::sync::Arc;
//!
//! # async fn example() -> mcp::Result<()> {
//! let registry = Arc::new(ToolRegistry::new());
//! mcp::serve_stdio(registry).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod protocol;
mod server;

pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION, RequestId, ServerCapabilities, ServerInfo,
    Tool, ToolContent,
};
pub use server::{MAX_MESSAGE_SIZE, Server, serve_stdio};
