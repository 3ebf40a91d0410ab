//! OpenAI-compatible inference client.
//!
//! Sends non-streaming chat completion requests to the inference endpoint.
//! Two timeout budgets apply: a base budget for tool-free histories and an
//! extended one once a tool result is in the message list, since those
//! requests tend to provoke longer generations.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use uuid::Uuid;

use super::config::ModelConfig;
use super::errors::InferenceError;
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ModelResponse, Role, ToolCall,
    ToolDefinition,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── ChatModel seam ──────────────────────────────────────────────────────────

/// The orchestrator's view of the inference endpoint.
///
/// The production implementation is [`InferenceClient`]; tests substitute
/// mocks that script responses without a network.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the full message list (and optional tool catalog) and await the
    /// complete response. Implementations must enforce a wall-clock timeout
    /// and surface it as [`InferenceError::Timeout`], never as a silent
    /// empty answer.
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ModelResponse, InferenceError>;
}

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for the LLM inference endpoint.
///
/// Created from [`ModelConfig`]. Holds one HTTP client per timeout budget,
/// mirroring the two-budget policy in the config.
pub struct InferenceClient {
    /// HTTP client for tool-free histories (base timeout).
    http: HttpClient,
    /// HTTP client for tool-result-bearing histories (extended timeout).
    http_long: HttpClient,
    config: ModelConfig,
}

impl InferenceClient {
    /// Create a new inference client from the model configuration.
    ///
    /// Does NOT check connectivity — that happens on the first request.
    pub fn from_config(config: ModelConfig) -> Result<Self, InferenceError> {
        let build = |timeout: Duration| {
            HttpClient::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(timeout)
                .build()
                .map_err(|e| InferenceError::ConnectionFailed {
                    endpoint: config.base_url.clone(),
                    reason: format!("failed to build HTTP client: {e}"),
                })
        };

        let http = build(config.timeout_for(false))?;
        let http_long = build(config.timeout_for(true))?;
        Ok(Self { http, http_long, config })
    }

    /// The base URL of the configured endpoint.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Whether any `tool` role message is present in the history.
    fn has_tool_results(messages: &[ChatMessage]) -> bool {
        messages.iter().any(|m| m.role == Role::Tool)
    }

    /// Convert the raw completion body into a [`ModelResponse`].
    ///
    /// Tool call argument strings are parsed to JSON here; unparseable
    /// arguments become an empty object rather than failing the whole
    /// response — the downstream schema validation reports the real problem.
    fn parse_response(body: &str) -> Result<ModelResponse, InferenceError> {
        let parsed: ChatCompletionResponse =
            serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
                reason: format!("invalid completion body: {e}"),
            })?;

        let choice = parsed.choices.into_iter().next().ok_or(InferenceError::EmptyResponse)?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let arguments = serde_json::from_str(&tc.function.arguments)
                    .unwrap_or_else(|_| serde_json::json!({}));
                let id = if tc.id.is_empty() {
                    format!("call_{}", Uuid::new_v4())
                } else {
                    tc.id
                };
                ToolCall { id, name: tc.function.name, arguments }
            })
            .collect();

        let content = choice.message.content.filter(|c| !c.is_empty());

        Ok(ModelResponse { content, tool_calls, finish_reason: choice.finish_reason })
    }
}

#[async_trait]
impl ChatModel for InferenceClient {
    async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ModelResponse, InferenceError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let long_budget = Self::has_tool_results(&messages);
        let timeout = self.config.timeout_for(long_budget);
        let client = if long_budget { &self.http_long } else { &self.http };

        let body = ChatCompletionRequest {
            model: self.config.model_name.clone(),
            messages,
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        // Log request metadata, not the full body — it can be huge.
        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            timeout_secs = timeout.as_secs(),
            "model request"
        );

        let response = client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout { duration_secs: timeout.as_secs() }
            } else {
                InferenceError::ConnectionFailed { endpoint: url.clone(), reason: e.to_string() }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError { status: status.as_u16(), body: body_text });
        }

        let body_text =
            response.text().await.map_err(|e| InferenceError::MalformedResponse {
                reason: format!("failed to read response body: {e}"),
            })?;

        Self::parse_response(&body_text)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
