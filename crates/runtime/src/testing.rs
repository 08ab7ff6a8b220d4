//! Scripted model backend for unit tests.

use crate::model::{Backend, ModelError, ModelRequest, ModelResponse, Usage};
use std::collections::VecDeque;
use std::sync::Mutex;
use storage::Message;

/// What the backend saw on one call.
#[derive(Debug, Clone)]
pub(crate) struct SeenRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
    pub temperature: Option<f32>,
}

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<Message, ModelError>>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, message: Message) -> Self {
        self.replies.lock().unwrap().push_back(Ok(message));
        self
    }

    pub fn fail(self, error: ModelError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl Backend for ScriptedBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        self.seen.lock().unwrap().push(SeenRequest {
            messages: request.messages.to_vec(),
            tools: request.tools.iter().map(|t| t.name.clone()).collect(),
            temperature: request.temperature,
        });
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Api("script exhausted".into())));
        next.map(|message| ModelResponse {
            message,
            usage: Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
            },
        })
    }
}
