//! MCP Client — JSON-RPC over HTTP to the remote VFB tool provider.
//!
//! This module handles:
//! - The fixed, versioned tool catalog (`search_terms`, `get_term_info`, `run_query`)
//! - Local argument validation before dispatch
//! - JSON-RPC 2.0 `tools/call` requests with a per-call timeout
//!
//! The orchestrator consumes this through the [`ToolInvoker`] seam so tests
//! can substitute a mock provider.

pub mod catalog;
pub mod client;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use catalog::{to_openai_tools, validate_tool_call};
pub use client::{McpClient, ToolInvoker};
pub use errors::McpError;
pub use types::ToolCallResult;
