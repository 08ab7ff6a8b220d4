//! Tool catalog, argument coercion and dispatch.

mod coerce;
pub mod errors;
mod registry;
mod relevance;
mod result;
mod schema;
mod tool;

pub use coerce::{RangePolicy, coerce_arguments};
pub use errors::{ArgumentError, ToolError, ToolFailure};
pub use registry::{DEFAULT_CALL_TIMEOUT, ToolRegistry};
pub use relevance::{RelevanceFilter, fold};
pub use result::{ERROR_MARKER, ToolResult};
pub use schema::{ParamKind, ParamSpec, ToolSchema};
pub use tool::Tool;
