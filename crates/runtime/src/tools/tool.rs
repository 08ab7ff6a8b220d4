//! Tool handler trait.

use super::{ToolFailure, ToolSchema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;

/// A capability the model can ask the runtime to execute.
///
/// `Args` is the tool's typed argument record. The registry coerces the
/// model's raw arguments against [`Tool::schema`] and decodes them into
/// `Args` once, so handler bodies never index into loose JSON.
pub trait Tool: Send + Sync + 'static {
    type Args: DeserializeOwned + Send + 'static;

    fn schema(&self) -> ToolSchema;

    fn call(&self, args: Self::Args) -> impl Future<Output = Result<String, ToolFailure>> + Send;
}

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe view of a [`Tool`], taking already-coerced JSON arguments.
pub(crate) trait ErasedTool: Send + Sync {
    fn call_json(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<String, ToolFailure>>;
}

impl<T: Tool> ErasedTool for T {
    fn call_json(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<String, ToolFailure>> {
        Box::pin(async move {
            let args: T::Args = serde_json::from_value(Value::Object(args))
                .map_err(|e| ToolFailure::InvalidInput(e.to_string()))?;
            self.call(args).await
        })
    }
}
