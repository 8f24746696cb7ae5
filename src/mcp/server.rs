use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::mcp::{
    InitializeParams, JsonRpcRequest, JsonRpcResponse, McpError, Tool, ToolCallParams,
};

#[async_trait]
pub trait McpHandler: Send + Sync {
    async fn initialize(&self, params: InitializeParams) -> std::result::Result<Value, McpError>;
    async fn list_tools(&self) -> std::result::Result<Vec<Tool>, McpError>;
    async fn call_tool(&self, params: ToolCallParams) -> std::result::Result<Value, McpError>;
}

/// Newline-delimited JSON-RPC server over stdio or TCP
#[derive(Clone)]
pub struct McpServer {
    handler: Arc<dyn McpHandler>,
}

impl McpServer {
    pub fn new(handler: Arc<dyn McpHandler>) -> Self {
        Self { handler }
    }

    /// Accept TCP clients on `addr`, one task per connection
    pub async fn run(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("MCP Server listening on {}", listener.local_addr()?);

        loop {
            let (stream, peer) = listener.accept().await?;
            let server = self.clone();
            tokio::spawn(async move {
                debug!(%peer, "Client connected");
                let (reader, writer) = stream.into_split();
                if let Err(e) = server.serve(reader, writer).await {
                    error!(%peer, "Error handling connection: {}", e);
                }
                debug!(%peer, "Client disconnected");
            });
        }
    }

    pub async fn run_stdio(&self) -> Result<()> {
        info!("MCP Server running on stdio");
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve one line-delimited stream until EOF
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let bytes_read = reader.read_until(b'\n', &mut buf).await?;
            if bytes_read == 0 {
                break;
            }

            let response = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.handle_line(line).await,
                Err(e) => {
                    warn!("Request is not valid UTF-8: {}", e);
                    Some(JsonRpcResponse::failure(
                        None,
                        McpError::Parse(format!("invalid UTF-8: {}", e)).into(),
                    ))
                }
            };

            if let Some(response) = response {
                let response_str = serde_json::to_string(&response)?;
                writer.write_all(response_str.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    /// Process one raw message. `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line.trim()) {
            Ok(request) => request,
            Err(e) => {
                warn!("Unparseable request: {}", e);
                return Some(JsonRpcResponse::failure(
                    None,
                    McpError::Parse(e.to_string()).into(),
                ));
            }
        };
        self.handle_request(request).await
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::failure(
                request.id,
                McpError::InvalidRequest(format!("unsupported jsonrpc version '{}'", request.jsonrpc))
                    .into(),
            ));
        }

        if request.is_notification() {
            debug!(method = %request.method, "Notification received");
            return None;
        }

        debug!(method = %request.method, "Request received");
        let result = self.dispatch(&request.method, request.params).await;

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(e) => {
                warn!(method = %request.method, "Request failed: {}", e);
                JsonRpcResponse::failure(request.id, e.into())
            }
        })
    }

    async fn dispatch(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> std::result::Result<Value, McpError> {
        match method {
            "initialize" => {
                let params: InitializeParams = match params {
                    Some(p) => serde_json::from_value(p)
                        .map_err(|e| McpError::InvalidParams(e.to_string()))?,
                    None => InitializeParams::default(),
                };
                self.handler.initialize(params).await
            }
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => {
                let tools = self.handler.list_tools().await?;
                Ok(serde_json::json!({ "tools": tools }))
            }
            "tools/call" => {
                let params: ToolCallParams = serde_json::from_value(params.unwrap_or_default())
                    .map_err(|e| McpError::InvalidParams(e.to_string()))?;
                self.handler.call_tool(params).await
            }
            other => Err(McpError::MethodNotFound(other.to_string())),
        }
    }
}
