//! MCP Client error types.

use thiserror::Error;

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// HTTP communication error (connection refused, malformed body, I/O).
    #[error("transport error: {reason}")]
    TransportError { reason: String },

    /// The provider returned a JSON-RPC error response.
    #[error("provider error [{code}]: {message}")]
    ProviderError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Tool not found in the catalog.
    #[error("unknown tool: '{name}'")]
    UnknownTool { name: String },

    /// Tool call arguments failed schema validation.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// A tool call timed out.
    #[error("tool call '{tool}' timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },
}
