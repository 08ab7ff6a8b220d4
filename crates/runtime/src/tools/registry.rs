//! Tool registry: catalog, relevance and dispatch.

use super::coerce::{RangePolicy, coerce_arguments};
use super::tool::ErasedTool;
use super::{RelevanceFilter, Tool, ToolError, ToolFailure, ToolResult, ToolSchema};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default upper bound on a single tool call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

struct Entry {
    schema: ToolSchema,
    relevance: RelevanceFilter,
    tool: Arc<dyn ErasedTool>,
}

/// Catalog of tools, in registration order.
pub struct ToolRegistry {
    entries: Vec<Entry>,
    range_policy: RangePolicy,
    call_timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            range_policy: RangePolicy::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_range_policy(mut self, policy: RangePolicy) -> Self {
        self.range_policy = policy;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Register a tool with the filter that decides when it is offered.
    pub fn register<T: Tool>(&mut self, tool: T, relevance: RelevanceFilter) -> Result<(), ToolError> {
        let schema = tool.schema();
        schema.validate()?;
        if self.find(&schema.name).is_some() {
            return Err(ToolError::DuplicateTool(schema.name));
        }
        debug!(tool = %schema.name, "tool registered");
        self.entries.push(Entry {
            schema,
            relevance,
            tool: Arc::new(tool),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.schema.name.as_str()).collect()
    }

    pub fn schema(&self, name: &str) -> Option<&ToolSchema> {
        self.find(name).map(|e| &e.schema)
    }

    pub fn relevance(&self, name: &str) -> Option<&RelevanceFilter> {
        self.find(name).map(|e| &e.relevance)
    }

    /// Every registered schema.
    pub fn list_schemas(&self) -> Vec<ToolSchema> {
        self.entries.iter().map(|e| e.schema.clone()).collect()
    }

    /// Schemas whose relevance filter accepts `utterance`.
    pub fn active_schemas(&self, utterance: &str) -> Vec<ToolSchema> {
        self.entries
            .iter()
            .filter(|e| e.relevance.is_relevant(utterance))
            .map(|e| e.schema.clone())
            .collect()
    }

    /// Coerce `arguments` and run the named tool.
    ///
    /// Only an unknown tool name is an `Err`. Bad arguments, handler
    /// failures, panics and timeouts all come back as an error
    /// [`ToolResult`] the model can read.
    pub async fn dispatch(&self, name: &str, arguments: &Value) -> Result<ToolResult, ToolError> {
        let entry = self
            .find(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let args = match coerce_arguments(&entry.schema, arguments, self.range_policy) {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = %name, "rejected arguments: {e}");
                return Ok(ToolResult::error(format!("{e} for tool '{name}'")));
            }
        };

        info!(tool = %name, args = %serde_json::Value::Object(args.clone()), "calling tool");

        let tool = Arc::clone(&entry.tool);
        let timeout = self.call_timeout;
        let task = tokio::spawn(async move { tokio::time::timeout(timeout, tool.call_json(args)).await });

        let result = match task.await {
            Ok(Ok(Ok(text))) => ToolResult::ok(text),
            Ok(Ok(Err(failure))) => {
                warn!(tool = %name, "tool failed: {failure}");
                ToolResult::error(failure)
            }
            Ok(Err(_elapsed)) => {
                warn!(tool = %name, ?timeout, "tool timed out");
                ToolResult::error(ToolFailure::Timeout(timeout.as_secs()))
            }
            Err(join) if join.is_panic() => {
                error!(tool = %name, "tool panicked");
                ToolResult::error(format!("tool '{name}' crashed"))
            }
            Err(join) => ToolResult::error(format!("tool '{name}' was cancelled: {join}")),
        };
        Ok(result)
    }

    fn find(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.schema.name == name)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .field("range_policy", &self.range_policy)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}
