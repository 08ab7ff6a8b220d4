//! Ollama chat backend.

use crate::model::{Backend, ModelError, ModelRequest, ModelResponse, Usage};
use crate::tools::ToolSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use storage::{Message, Role, ToolCallRequest};
use tracing::{debug, error};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1:8b";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ApiOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ApiOptions {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCallOut<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ApiToolCallOut<'a> {
    function: ApiFunctionOut<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunctionOut<'a> {
    name: &'a str,
    arguments: &'a Value,
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ApiToolFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    message: ApiResponseMessage,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ApiToolCallIn>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCallIn {
    function: ApiFunctionIn,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionIn {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ApiTags {
    #[serde(default)]
    models: Vec<ApiModelTag>,
}

#[derive(Debug, Deserialize)]
struct ApiModelTag {
    name: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an Ollama backend.
#[derive(Debug, Clone)]
pub struct OllamaBackendBuilder {
    base_url: String,
    model: String,
    timeout: Duration,
    keep_alive: Option<String>,
}

impl Default for OllamaBackendBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            keep_alive: None,
        }
    }
}

impl OllamaBackendBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long Ollama keeps the model loaded after a call, e.g. `"5m"`.
    pub fn keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }

    pub fn build(self) -> OllamaBackend {
        OllamaBackend {
            client: reqwest::Client::new(),
            base_url: self.base_url.trim_end_matches('/').to_string(),
            model: self.model,
            timeout: self.timeout,
            keep_alive: self.keep_alive,
        }
    }
}

/// Result of probing an Ollama server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub reachable: bool,
    pub model_available: bool,
    /// Installed model names.
    pub models: Vec<String>,
}

/// Ollama `/api/chat` backend.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
    keep_alive: Option<String>,
}

impl OllamaBackend {
    pub fn builder() -> OllamaBackendBuilder {
        OllamaBackendBuilder::default()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that the server answers and has the configured model.
    ///
    /// An unreachable server is reported in the status, not as an error.
    pub async fn health_check(&self) -> HealthStatus {
        let url = format!("{}/api/tags", self.base_url);
        let tags = async {
            let response = self
                .client
                .get(&url)
                .timeout(HEALTH_TIMEOUT)
                .send()
                .await?
                .error_for_status()?;
            response.json::<ApiTags>().await
        };
        match tags.await {
            Ok(tags) => {
                let models: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
                let model_available = models.iter().any(|name| self.is_configured_model(name));
                HealthStatus {
                    reachable: true,
                    model_available,
                    models,
                }
            }
            Err(e) => {
                debug!("ollama health check failed: {e}");
                HealthStatus {
                    reachable: false,
                    model_available: false,
                    models: Vec::new(),
                }
            }
        }
    }

    fn is_configured_model(&self, installed: &str) -> bool {
        installed == self.model
            || installed.strip_suffix(":latest") == Some(self.model.as_str())
    }

    fn role_to_api(role: Role) -> &'static str {
        role.as_str()
    }

    fn message_to_api(msg: &Message) -> ApiMessage<'_> {
        ApiMessage {
            role: Self::role_to_api(msg.role),
            content: &msg.content,
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|call| ApiToolCallOut {
                    function: ApiFunctionOut {
                        name: &call.name,
                        arguments: &call.arguments,
                    },
                })
                .collect(),
            tool_name: msg.tool_name.as_deref(),
        }
    }

    fn tool_to_api(schema: &ToolSchema) -> ApiTool<'_> {
        ApiTool {
            tool_type: "function",
            function: ApiToolFunction {
                name: &schema.name,
                description: &schema.description,
                parameters: schema.to_json_schema(),
            },
        }
    }

    fn response_to_message(message: ApiResponseMessage) -> Message {
        let calls = message
            .tool_calls
            .into_iter()
            .map(|call| ToolCallRequest::new(call.function.name, decode_arguments(call.function.arguments)))
            .collect();
        Message::assistant_with_calls(message.content, calls)
    }

    fn map_send_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            error!("ollama request timed out after {:?}", self.timeout);
            ModelError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            ModelError::Network(format!("cannot reach ollama at {}: {e}", self.base_url))
        }
    }
}

/// Some models send tool arguments as a JSON-encoded string.
fn decode_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        other => other,
    }
}

impl std::fmt::Display for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ollama({} @ {})", self.model, self.base_url)
    }
}

impl Backend for OllamaBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let api_request = ApiRequest {
            model: &self.model,
            messages: request.messages.iter().map(Self::message_to_api).collect(),
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
            stream: false,
            options: request.temperature.map(|temperature| ApiOptions { temperature }),
            keep_alive: self.keep_alive.as_deref(),
        };

        debug!(
            model = %self.model,
            messages = api_request.messages.len(),
            tools = api_request.tools.len(),
            "ollama chat request"
        );

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(self.timeout)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::NOT_FOUND && body.contains("model") {
                return Err(ModelError::Api(format!(
                    "{status}: {body} (try `ollama pull {}`)",
                    self.model
                )));
            }
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let usage = Usage {
            prompt_tokens: api_response.prompt_eval_count,
            completion_tokens: api_response.eval_count,
        };
        let message = Self::response_to_message(api_response.message);
        debug!(tool_calls = message.tool_calls.len(), usage = usage.total(), "ollama chat response");

        Ok(ModelResponse { message, usage })
    }
}
