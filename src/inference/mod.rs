//! Inference Client — OpenAI-compatible API client for the LLM endpoint.
//!
//! This module handles all communication with the model endpoint:
//! - Non-streaming chat completions with tool definitions
//! - Dual timeout budgets (base vs. tool-result-bearing histories)
//! - Model configuration loading from YAML
//!
//! The client speaks the OpenAI Chat Completions API, making the model
//! interchangeable via config.

pub mod client;
pub mod config;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use client::{ChatModel, InferenceClient};
pub use config::ModelConfig;
pub use errors::InferenceError;
pub use types::{ChatMessage, ModelResponse, Role, ToolCall, ToolDefinition};
