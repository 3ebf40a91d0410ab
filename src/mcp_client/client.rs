//! MCP Client — high-level interface for tool execution.
//!
//! Speaks JSON-RPC 2.0 over HTTP to the remote VFB MCP provider. Catalog
//! validation happens locally; provider-level errors are folded into
//! [`ToolCallResult`] so the orchestrator can keep the turn alive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::catalog;
use super::errors::McpError;
use super::types::{JsonRpcRequest, JsonRpcResponse, ToolCallResult};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default timeout for tool call execution (ms).
const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── ToolInvoker seam ────────────────────────────────────────────────────────

/// The orchestrator's view of the tool provider.
///
/// The production implementation is [`McpClient`]; tests substitute mocks.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Invoke a named tool with the given arguments.
    ///
    /// `Ok` with `success: false` means the provider answered with an
    /// application error; `Err` means transport failure or timeout.
    async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, McpError>;
}

// ─── McpClient ───────────────────────────────────────────────────────────────

/// High-level MCP client for the remote VFB tool provider.
pub struct McpClient {
    http: HttpClient,
    /// Base URL of the provider, e.g. `https://vfb3-mcp.virtualflybrain.org`.
    endpoint: String,
    /// Monotonic JSON-RPC request id.
    next_id: AtomicU64,
    /// Tool call timeout in milliseconds.
    call_timeout_ms: u64,
}

impl McpClient {
    /// Create a new MCP client for the given provider endpoint.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, McpError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| McpError::TransportError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        let endpoint = into_trimmed(endpoint);
        tracing::debug!(
            endpoint = %endpoint,
            catalog_version = catalog::CATALOG_VERSION,
            "mcp client ready"
        );
        Ok(Self {
            http,
            endpoint,
            next_id: AtomicU64::new(1),
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        })
    }

    /// Set the tool call timeout in milliseconds.
    pub fn set_call_timeout(&mut self, timeout_ms: u64) {
        self.call_timeout_ms = timeout_ms;
    }

    /// The configured provider endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a JSON-RPC request and await the raw response.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = JsonRpcRequest::new(id, method, params);

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| McpError::TransportError { reason: e.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(McpError::TransportError {
                reason: format!("HTTP {status}: {body_text}"),
            });
        }

        response
            .json::<JsonRpcResponse>()
            .await
            .map_err(|e| McpError::TransportError {
                reason: format!("malformed JSON-RPC response: {e}"),
            })
    }
}

/// Extract the result payload from a JSON-RPC response, or the error.
fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ProviderError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }
    response.result.ok_or(McpError::TransportError {
        reason: "response carried neither result nor error".to_string(),
    })
}

#[async_trait]
impl ToolInvoker for McpClient {
    /// Execute a tool call against the remote provider.
    ///
    /// Steps:
    /// 1. Validate the tool exists and required arguments are present
    /// 2. Send JSON-RPC `tools/call`, bounded by the call timeout
    /// 3. Fold provider errors into a failed [`ToolCallResult`]
    async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, McpError> {
        let start = Instant::now();

        catalog::validate_tool_call(tool_name, &arguments)?;

        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments,
        });

        let response = tokio::time::timeout(
            Duration::from_millis(self.call_timeout_ms),
            self.request("tools/call", Some(params)),
        )
        .await
        .map_err(|_| McpError::Timeout {
            tool: tool_name.to_string(),
            timeout_ms: self.call_timeout_ms,
        })??;

        let elapsed = start.elapsed().as_millis() as u64;

        match extract_result(response) {
            Ok(result) => Ok(ToolCallResult {
                tool_name: tool_name.to_string(),
                success: true,
                result: Some(result),
                error: None,
                execution_time_ms: elapsed,
            }),
            Err(McpError::ProviderError { code, message, .. }) => {
                tracing::warn!(tool = tool_name, code, error = %message, "provider error");
                Ok(ToolCallResult {
                    tool_name: tool_name.to_string(),
                    success: false,
                    result: None,
                    error: Some(format!("[{code}] {message}")),
                    execution_time_ms: elapsed,
                })
            }
            Err(e) => Err(e),
        }
    }
}

fn into_trimmed(endpoint: impl Into<String>) -> String {
    let s: String = endpoint.into();
    s.trim_end_matches('/').to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
