//! MCP server over newline-delimited JSON-RPC.

use std::sync::Arc;

use runtime::{ToolError, ToolRegistry};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::{
    CallToolParams, CallToolResult, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION, ServerCapabilities,
    ServerInfo, Tool,
};

/// Maximum size of one message in either direction (1MB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Exposes a [`ToolRegistry`] as an MCP tool server.
pub struct Server {
    registry: Arc<ToolRegistry>,
    info: ServerInfo,
}

impl Server {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            info: ServerInfo {
                name: "charla".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Serve requests from `reader` until end of input.
    ///
    /// At most [`MAX_MESSAGE_SIZE`] bytes of a line are buffered; longer
    /// lines are drained and answered with an error.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(tools = self.registry.len(), "mcp server ready");
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = (&mut reader)
                .take(MAX_MESSAGE_SIZE as u64 + 1)
                .read_until(b'\n', &mut buf)
                .await?;
            if read == 0 {
                break;
            }

            let response = if buf.len() > MAX_MESSAGE_SIZE && buf.last() != Some(&b'\n') {
                discard_line(&mut reader).await?;
                warn!("request over {MAX_MESSAGE_SIZE} bytes dropped");
                Some(too_large())
            } else {
                let line = String::from_utf8_lossy(&buf);
                if line.trim().is_empty() {
                    continue;
                }
                self.handle_line(line.trim_end()).await
            };
            let Some(response) = response else {
                continue;
            };

            let mut encoded = serde_json::to_string(&response)?;
            if encoded.len() > MAX_MESSAGE_SIZE {
                warn!(size = encoded.len(), "response too large");
                let error = JsonRpcError::new(
                    INTERNAL_ERROR,
                    format!("response of {} bytes exceeds {MAX_MESSAGE_SIZE}", encoded.len()),
                );
                encoded = serde_json::to_string(&JsonRpcResponse::failure(response.id, error))?;
            }
            writer.write_all(encoded.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        info!("mcp client disconnected");
        Ok(())
    }

    /// Handle one raw line. Notifications produce no response.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        if line.len() > MAX_MESSAGE_SIZE {
            return Some(too_large());
        }
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("unparsable request: {e}");
                return Some(JsonRpcResponse::failure(
                    None,
                    JsonRpcError::new(PARSE_ERROR, format!("parse error: {e}")),
                ));
            }
        };
        self.handle(request).await
    }

    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, id = ?request.id, "request");
        if request.is_notification() {
            debug!(method = %request.method, "notification ignored");
            return None;
        }
        let id = request.id.clone();
        let outcome = match request.method.as_str() {
            "initialize" => self.initialize(request.params),
            "ping" => Ok(Value::Object(Default::default())),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(request.params).await,
            other => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            )),
        };
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    fn initialize(&self, params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();
        info!(
            client = params.client_info.as_ref().map(|c| c.name.as_str()).unwrap_or("unknown"),
            protocol = params.protocol_version.as_deref().unwrap_or("unspecified"),
            "client initialized"
        );
        to_value(InitializeResult {
            protocol_version: PROTOCOL_VERSION,
            capabilities: ServerCapabilities::default(),
            server_info: self.info.clone(),
        })
    }

    fn list_tools(&self) -> std::result::Result<Value, JsonRpcError> {
        let tools = self.registry.list_schemas().iter().map(Tool::from).collect();
        to_value(ListToolsResult { tools })
    }

    async fn call_tool(&self, params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
        let params: CallToolParams = params
            .ok_or_else(|| JsonRpcError::new(INVALID_PARAMS, "missing params"))
            .and_then(|p| {
                serde_json::from_value(p)
                    .map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("invalid params: {e}")))
            })?;
        let arguments = params.arguments.unwrap_or(Value::Null);
        match self.registry.dispatch(&params.name, &arguments).await {
            Ok(result) => to_value(CallToolResult::from(result)),
            Err(e @ ToolError::UnknownTool(_)) => {
                Err(JsonRpcError::new(INVALID_PARAMS, e.to_string()))
            }
            Err(e) => Err(JsonRpcError::new(INTERNAL_ERROR, e.to_string())),
        }
    }
}

fn too_large() -> JsonRpcResponse {
    JsonRpcResponse::failure(None, JsonRpcError::new(INVALID_REQUEST, "request too large"))
}

/// Skip the rest of the current line without buffering it.
async fn discard_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<()> {
    loop {
        let (consumed, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            }
        };
        reader.consume(consumed);
        if done {
            return Ok(());
        }
    }
}

fn to_value(value: impl serde::Serialize) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::new(INTERNAL_ERROR, e.to_string()))
}

/// Serve `registry` on the process's stdin and stdout.
pub async fn serve_stdio(registry: Arc<ToolRegistry>) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    Server::new(registry).serve(stdin, tokio::io::stdout()).await
}
