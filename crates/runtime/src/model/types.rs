use super::errors::ModelError;
use crate::tools::ToolSchema;
use serde::{Deserialize, Serialize};
use std::future::Future;
use storage::Message;

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// Everything needed for a model request.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub messages: &'a [Message],
    /// Tools the model may call. Empty means a plain chat turn.
    pub tools: &'a [ToolSchema],
    pub temperature: Option<f32>,
}

impl<'a> ModelRequest<'a> {
    pub fn new(messages: &'a [Message]) -> Self {
        Self {
            messages,
            tools: &[],
            temperature: None,
        }
    }

    pub fn with_tools(mut self, tools: &'a [ToolSchema]) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// The response from a model.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// The assistant message, possibly carrying tool calls.
    pub message: Message,
    pub usage: Usage,
}

/// Trait for model runtimes.
///
/// A call is a single synchronous request/response exchange; there is no
/// streaming and no retry at this layer.
pub trait Backend: Send + Sync {
    fn call(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelResponse, ModelError>> + Send;
}

impl<T: Backend> Backend for &T {
    fn call(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelResponse, ModelError>> + Send {
        (**self).call(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates() {
        let mut usage = Usage {
            prompt_tokens: 100,
            completion_tokens: 20,
        };
        usage += Usage {
            prompt_tokens: 150,
            completion_tokens: 30,
        };
        assert_eq!(usage.total(), 300);
    }

    #[test]
    fn request_defaults_to_no_tools() {
        let messages = [Message::user("hola")];
        let request = ModelRequest::new(&messages);
        assert!(request.tools.is_empty());
        assert!(request.temperature.is_none());
    }
}
