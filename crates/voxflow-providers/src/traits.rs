//! LLM provider trait — the turn-loop boundary.
//!
//! The flow engine hands a context snapshot (messages + active tools) to a
//! provider and gets back either assistant text or a single tool-call
//! request. The engine must be able to submit again with an updated
//! context without restarting the session, so providers are stateless
//! between calls.

use async_trait::async_trait;
use voxflow_core::types::{LlmResponse, Message, ToolDefinition};

/// Configuration passed to each LLM call.
#[derive(Clone, Debug)]
pub struct LlmRequestConfig {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
}

impl Default for LlmRequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.3,
        }
    }
}

/// Trait that all LLM providers must implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Submit one turn.
    ///
    /// # Arguments
    /// * `messages` — The transcript so far, in conversation order.
    /// * `tools`    — The currently advertised tool set, if any.
    /// * `model`    — Model identifier.
    /// * `config`   — Temperature, max_tokens.
    ///
    /// # Returns
    /// An `LlmResponse` with assistant text and/or one tool-call request.
    /// On API errors, returns `LlmResponse::error(...)` instead of propagating.
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> LlmResponse;

    /// The default model for this provider instance.
    fn default_model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
