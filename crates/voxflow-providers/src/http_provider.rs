//! Generic HTTP-based LLM provider for OpenAI-compatible APIs.
//!
//! Talks directly to any OpenAI-compatible `/chat/completions` endpoint.
//! All transport and API failures convert to `LlmResponse::error(...)` —
//! a dead endpoint must surface as a spoken apology, never a crash.

use async_trait::async_trait;
use tracing::{debug, error};

use voxflow_core::config::schema::LlmConfig;
use voxflow_core::types::{ChatCompletionRequest, ChatCompletionResponse, LlmResponse, Message, ToolDefinition};

use crate::traits::{LlmProvider, LlmRequestConfig};

/// Request timeout for one completion call.
const REQUEST_TIMEOUT_SECS: u64 = 120;

// ─────────────────────────────────────────────
// HttpProvider
// ─────────────────────────────────────────────

/// A generic LLM provider that talks to any OpenAI-compatible HTTP API.
pub struct HttpProvider {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    /// API base URL (e.g. `"https://api.openai.com/v1"`).
    api_base: String,
    /// API key for Bearer authentication.
    api_key: String,
    /// Default model for this provider instance.
    default_model: String,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl HttpProvider {
    /// Create a new HttpProvider.
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        HttpProvider {
            client,
            api_base: api_base.into(),
            api_key: api_key.into(),
            default_model: model.into(),
        }
    }

    /// Build a provider from the `llm` config section.
    pub fn from_config(config: &LlmConfig) -> Self {
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Self::new(api_base, config.api_key.clone(), config.model.clone())
    }

    /// Build the full chat completions URL.
    fn completions_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> LlmResponse {
        debug!(
            model = %model,
            messages = messages.len(),
            tools = tools.map_or(0, |t| t.len()),
            "Calling LLM"
        );

        let request_body = ChatCompletionRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            tools: tools.map(|t| t.to_vec()),
            tool_choice: tools.map(|_| "auto".to_string()),
            max_tokens: Some(config.max_tokens),
            temperature: Some(config.temperature),
        };

        let url = self.completions_url();

        let result = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await;

        let response = match result {
            Ok(resp) => resp,
            Err(e) => {
                error!(error = %e, "HTTP request failed");
                return LlmResponse::error(format!("Error calling LLM: {}", e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(status = %status, body = %error_text, "API error");
            return LlmResponse::error(format!("Error calling LLM: {} — {}", status, error_text));
        }

        match response.json::<ChatCompletionResponse>().await {
            Ok(chat_resp) => {
                let llm_resp: LlmResponse = chat_resp.into();
                debug!(
                    has_content = llm_resp.content.is_some(),
                    has_tool_call = llm_resp.has_tool_call(),
                    finish_reason = llm_resp.finish_reason.as_deref().unwrap_or("?"),
                    "LLM response received"
                );
                llm_resp
            }
            Err(e) => {
                error!(error = %e, "Failed to parse LLM response");
                LlmResponse::error(format!("Error parsing LLM response: {}", e))
            }
        }
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn display_name(&self) -> &str {
        "OpenAI-compatible"
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // ── Unit tests ──

    #[test]
    fn test_completions_url_trailing_slash() {
        let provider = HttpProvider::new("https://api.openai.com/v1/", "key", "gpt-4o");
        assert_eq!(
            provider.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_completions_url_no_trailing_slash() {
        let provider = HttpProvider::new("https://api.openai.com/v1", "key", "gpt-4o");
        assert_eq!(
            provider.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_from_config_defaults_api_base() {
        let config = LlmConfig::default();
        let provider = HttpProvider::from_config(&config);
        assert_eq!(provider.api_base, "https://api.openai.com/v1");
        assert_eq!(provider.default_model(), "gpt-4o");
    }

    #[test]
    fn test_from_config_custom_base() {
        let config = LlmConfig {
            api_base: Some("https://proxy.example.com/v1".to_string()),
            ..Default::default()
        };
        let provider = HttpProvider::from_config(&config);
        assert_eq!(provider.api_base, "https://proxy.example.com/v1");
    }

    // ── Integration tests with mock server ──

    #[tokio::test]
    async fn test_chat_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-test",
                "choices": [{
                    "message": {
                        "content": "Hello! What would you like to order?",
                        "tool_calls": null
                    },
                    "finish_reason": "stop"
                }],
                "usage": {
                    "prompt_tokens": 10,
                    "completion_tokens": 5,
                    "total_tokens": 15
                }
            })))
            .mount(&mock_server)
            .await;

        let provider = HttpProvider::new(mock_server.uri(), "test-key-123", "gpt-4o");

        let messages = vec![Message::system("You take phone orders."), Message::user("Hello")];
        let resp = provider
            .chat(&messages, None, "gpt-4o", &LlmRequestConfig::default())
            .await;

        assert_eq!(
            resp.content.as_deref(),
            Some("Hello! What would you like to order?")
        );
        assert!(!resp.has_tool_call());
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
    }

    #[tokio::test]
    async fn test_chat_with_tool_call() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-tools",
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_abc123",
                            "type": "function",
                            "function": {
                                "name": "get_menu",
                                "arguments": "{}"
                            }
                        }]
                    },
                    "finish_reason": "tool_calls"
                }],
                "usage": null
            })))
            .mount(&mock_server)
            .await;

        let provider = HttpProvider::new(mock_server.uri(), "key", "gpt-4o");

        let tool_def = ToolDefinition::new(
            "get_menu",
            "List the menu",
            serde_json::json!({"type": "object", "properties": {}}),
        );

        let resp = provider
            .chat(
                &[Message::user("What's on the menu?")],
                Some(&[tool_def]),
                "gpt-4o",
                &LlmRequestConfig::default(),
            )
            .await;

        assert!(resp.content.is_none());
        let call = resp.tool_call.unwrap();
        assert_eq!(call.name, "get_menu");
        assert_eq!(call.call_id, "call_abc123");
    }

    #[tokio::test]
    async fn test_chat_api_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "message": "Rate limit exceeded", "type": "rate_limit_error" }
            })))
            .mount(&mock_server)
            .await;

        let provider = HttpProvider::new(mock_server.uri(), "key", "gpt-4o");
        let resp = provider
            .chat(&[Message::user("Hello")], None, "gpt-4o", &LlmRequestConfig::default())
            .await;

        // Should return error message, not panic
        let content = resp.content.unwrap();
        assert!(content.contains("Error calling LLM"));
        assert!(content.contains("429"));
    }

    #[tokio::test]
    async fn test_chat_network_error() {
        // Point to a port that's not listening
        let provider = HttpProvider::new("http://127.0.0.1:1", "key", "gpt-4o");
        let resp = provider
            .chat(&[Message::user("Hello")], None, "gpt-4o", &LlmRequestConfig::default())
            .await;

        assert!(resp.content.unwrap().contains("Error calling LLM"));
    }

    #[tokio::test]
    async fn test_chat_sends_correct_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "max_tokens": 1024,
                "temperature": 0.3
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-body",
                "choices": [{
                    "message": { "content": "ok" },
                    "finish_reason": "stop"
                }],
                "usage": null
            })))
            .mount(&mock_server)
            .await;

        let provider = HttpProvider::new(mock_server.uri(), "key", "gpt-4o-mini");
        let resp = provider
            .chat(&[Message::user("test")], None, "gpt-4o-mini", &LlmRequestConfig::default())
            .await;

        // If the body matcher fails, wiremock returns 404 → we'd get an error
        assert_eq!(resp.content.as_deref(), Some("ok"));
    }
}
