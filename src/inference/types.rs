//! Shared types for the inference client.
//!
//! These mirror the OpenAI Chat Completions API types, used for both
//! request building and response parsing.

use serde::{Deserialize, Serialize};

// ─── Request Types ───────────────────────────────────────────────────────────

/// A single message in the conversation.
///
/// Serialization notes for OpenAI-compatible endpoints:
/// - `content` must be `""` (not `null`) for assistant messages with tool calls.
///   Several backends misinterpret `null` content and fail to recognize the
///   tool call round-trip pattern.
/// - `tool_call_id` and `tool_calls` are skipped when `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(serialize_with = "serialize_content")]
    pub content: Option<String>,
    /// Tool call results are sent back as `tool` role messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Assistant messages may contain tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallResponse>>,
}

impl ChatMessage {
    /// A plain text message with the given role.
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// A `tool` role message answering the tool call with the given id.
    ///
    /// The orchestrator must produce exactly one of these per tool call the
    /// model issued — the endpoint errors (or hallucinates) on unpaired calls.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: None,
        }
    }

    /// An assistant message that carries tool calls (echoed back as history).
    pub fn assistant_tool_calls(calls: &[ToolCall]) -> Self {
        let echoed = calls
            .iter()
            .map(|tc| ToolCallResponse {
                id: tc.id.clone(),
                r#type: "function".to_string(),
                function: FunctionCallResponse {
                    name: tc.name.clone(),
                    arguments: serde_json::to_string(&tc.arguments).unwrap_or_default(),
                },
            })
            .collect();
        Self {
            role: Role::Assistant,
            content: None,
            tool_call_id: None,
            tool_calls: Some(echoed),
        }
    }
}

/// Custom serializer for `content`: emit `""` instead of `null` when `None`.
fn serialize_content<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(s) => serializer.serialize_str(s),
        None => serializer.serialize_str(""),
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Tool definition sent in the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

/// Function definition within a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// A parsed tool call extracted from the model's response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this tool call (generated if the model doesn't provide one).
    pub id: String,
    /// Tool name, e.g. `"search_terms"`.
    pub name: String,
    /// Parsed JSON arguments.
    pub arguments: serde_json::Value,
}

/// Tool call as returned in the OpenAI response format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub id: String,
    pub r#type: String,
    pub function: FunctionCallResponse,
}

/// Function call details in a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallResponse {
    pub name: String,
    pub arguments: String,
}

/// Complete (non-streaming) model response, reduced to the fields the
/// orchestrator consumes.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// The assistant's text content, if any.
    pub content: Option<String>,
    /// Tool calls requested by the model, in the order returned.
    pub tool_calls: Vec<ToolCall>,
    /// Why the model stopped: `"stop"`, `"tool_calls"`, etc.
    pub finish_reason: Option<String>,
}

impl ModelResponse {
    /// Whether the model asked for any tool invocations.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Raw completion body from the OpenAI API.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

/// A single choice within a completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
    pub finish_reason: Option<String>,
}

/// The assistant message within a completion choice.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallResponse>>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_content_serializes_as_empty_string() {
        let msg = ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_call_id: None,
            tool_calls: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"content\":\"\""), "null content must become \"\"");
    }

    #[test]
    fn tool_fields_omitted_when_none() {
        let msg = ChatMessage::text(Role::User, "what is the mushroom body?");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("tool_call_id"));
        assert!(!json.contains("tool_calls"));
    }

    #[test]
    fn tool_result_carries_call_id() {
        let msg = ChatMessage::tool_result("call_1", "3 results");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"tool_call_id\":\"call_1\""));
        assert!(json.contains("\"role\":\"tool\""));
    }

    #[test]
    fn assistant_tool_calls_round_trip() {
        let calls = vec![ToolCall {
            id: "call_7".into(),
            name: "search_terms".into(),
            arguments: serde_json::json!({"query": "mushroom body"}),
        }];
        let msg = ChatMessage::assistant_tool_calls(&calls);
        assert_eq!(msg.role, Role::Assistant);
        let echoed = msg.tool_calls.unwrap();
        assert_eq!(echoed[0].function.name, "search_terms");
        assert!(echoed[0].function.arguments.contains("mushroom body"));
    }

    #[test]
    fn tools_omitted_from_request_when_none() {
        let req = ChatCompletionRequest {
            model: "test".to_string(),
            messages: vec![],
            tools: None,
            tool_choice: None,
            temperature: 0.7,
            max_tokens: 1024,
            stream: false,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("tools"), "tools should be omitted when None");
    }

    #[test]
    fn completion_response_deserializes() {
        let body = r#"{
            "choices": [{
                "message": {"content": "The mushroom body is a neuropil.", "tool_calls": null},
                "finish_reason": "stop"
            }]
        }"#;
        let resp: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.choices.len(), 1);
        assert!(resp.choices[0].message.content.as_deref().unwrap().contains("neuropil"));
    }
}
