//! Core types for Voxflow — transcript messages and the LLM wire format.
//!
//! The transcript only ever holds plain role+content messages: tool results
//! re-enter the conversation as *system* messages, and the tool-call frame
//! itself is never stored. This keeps the persisted transcript format and
//! the chat-completions wire format identical.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// Speaker role of a transcript message.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single transcript message.
///
/// The transcript is an append-only ordered sequence of these; order is
/// conversation order and is the model's only memory.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Message {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ─────────────────────────────────────────────
// Tool calls
// ─────────────────────────────────────────────

/// A tool invocation requested by the model.
///
/// Produced by the provider, consumed exactly once by the dispatcher
/// (moved by value, never re-dispatched).
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallRequest {
    /// Opaque id assigned by the model, used for log correlation.
    pub call_id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON-encoded argument object, exactly as the model produced it.
    pub arguments: String,
}

impl ToolCallRequest {
    /// Create a new tool-call request.
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        ToolCallRequest {
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the argument payload into a JSON object.
    ///
    /// An empty payload parses as an empty object (models omit arguments
    /// for parameterless tools).
    pub fn parse_arguments(&self) -> Result<serde_json::Map<String, serde_json::Value>, String> {
        let raw = self.arguments.trim();
        if raw.is_empty() {
            return Ok(serde_json::Map::new());
        }
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(other) => Err(format!("arguments must be a JSON object, got {other}")),
            Err(e) => Err(format!("arguments are not valid JSON: {e}")),
        }
    }
}

// ─────────────────────────────────────────────
// Tool definitions (advertised to the LLM)
// ─────────────────────────────────────────────

/// Definition of a callable function, in the chat-completions format.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// Always "function".
    #[serde(rename = "type")]
    pub tool_type: String,
    /// The function schema.
    pub function: FunctionDefinition,
}

/// Name, description, and JSON-Schema parameters of a function tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

// ─────────────────────────────────────────────
// LLM response
// ─────────────────────────────────────────────

/// Response from one turn-loop submission.
///
/// Carries assistant text, a tool-call request, or both. The engine
/// dispatches one call at a time; parallel calls beyond the first are
/// dropped during wire conversion.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    /// Assistant text (None when the model only requested a tool).
    pub content: Option<String>,
    /// Tool call requested by the model, if any.
    pub tool_call: Option<ToolCallRequest>,
    /// Why the model stopped generating.
    pub finish_reason: Option<String>,
    /// Token usage statistics.
    pub usage: Option<UsageInfo>,
    /// True when this response describes a provider failure rather than
    /// model output. The engine speaks a fallback line instead of the
    /// error text.
    pub error: bool,
}

impl LlmResponse {
    /// Create an error response (error text as content, no tool call).
    pub fn error(msg: impl Into<String>) -> Self {
        LlmResponse {
            content: Some(msg.into()),
            error: true,
            ..Default::default()
        }
    }

    /// Whether the response requests a tool invocation.
    pub fn has_tool_call(&self) -> bool {
        self.tool_call.is_some()
    }
}

/// Token usage statistics from the LLM.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UsageInfo {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// ─────────────────────────────────────────────
// Chat-completions wire format
// ─────────────────────────────────────────────

/// Request body for an OpenAI-compatible chat completion API.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Raw chat completion response. Used internally for deserialization.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: Option<String>,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<UsageInfo>,
}

/// A single choice in a chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: WireAssistantMessage,
    pub finish_reason: Option<String>,
}

/// The assistant message within a chat completion choice.
#[derive(Debug, Deserialize)]
pub struct WireAssistantMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

/// A tool call as it appears on the wire.
#[derive(Debug, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    pub function: WireFunctionCall,
}

/// The function name and raw argument string within a wire tool call.
#[derive(Debug, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    pub arguments: String,
}

impl From<ChatCompletionResponse> for LlmResponse {
    fn from(resp: ChatCompletionResponse) -> Self {
        let choice = match resp.choices.into_iter().next() {
            Some(c) => c,
            None => return LlmResponse::error("No choices in response"),
        };

        let mut calls = choice.message.tool_calls.unwrap_or_default();
        if calls.len() > 1 {
            tracing::warn!(
                dropped = calls.len() - 1,
                "model returned parallel tool calls; dispatching the first only"
            );
        }
        let tool_call = if calls.is_empty() {
            None
        } else {
            let wire = calls.remove(0);
            Some(ToolCallRequest::new(
                wire.id,
                wire.function.name,
                wire.function.arguments,
            ))
        };

        LlmResponse {
            content: choice.message.content,
            tool_call,
            finish_reason: choice.finish_reason,
            usage: resp.usage,
            error: false,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
