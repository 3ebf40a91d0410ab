//! Model configuration loading and validation.
//!
//! Reads a YAML config describing the inference endpoint. Config is the
//! single source of truth for the endpoint URL, model name, sampling, and
//! timeout budgets — switching models is a config change, not a code change.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::errors::InferenceError;

/// Default request timeout for histories without tool results (seconds).
fn default_base_timeout_secs() -> u64 {
    30
}

/// Default request timeout once tool results are in the history (seconds).
///
/// Tool-result-bearing requests provoke longer generations — the model has
/// real data to summarize — so they get a larger budget.
fn default_tool_turn_timeout_secs() -> u64 {
    90
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    1024
}

/// The inference endpoint's runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Base URL of the OpenAI-compatible endpoint, e.g. `http://ollama:11434/v1`.
    pub base_url: String,
    /// Model name sent in the request body, e.g. `phi3:3.8b`.
    pub model_name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Timeout for requests whose history carries no tool result yet.
    #[serde(default = "default_base_timeout_secs")]
    pub base_timeout_secs: u64,
    /// Timeout once a tool result is in the history.
    #[serde(default = "default_tool_turn_timeout_secs")]
    pub tool_turn_timeout_secs: u64,
}

impl ModelConfig {
    /// Timeout budget for a request, depending on whether the message list
    /// already carries a tool result.
    pub fn timeout_for(&self, has_tool_results: bool) -> Duration {
        if has_tool_results {
            Duration::from_secs(self.tool_turn_timeout_secs)
        } else {
            Duration::from_secs(self.base_timeout_secs)
        }
    }
}

/// Load the model config from a YAML file.
pub fn load_model_config(path: &Path) -> Result<ModelConfig, InferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    let config: ModelConfig =
        serde_yaml::from_str(&raw).map_err(|e| InferenceError::ConfigError {
            reason: format!("failed to parse {}: {e}", path.display()),
        })?;

    if config.base_url.is_empty() {
        return Err(InferenceError::ConfigError {
            reason: "base_url must not be empty".to_string(),
        });
    }
    Ok(config)
}
