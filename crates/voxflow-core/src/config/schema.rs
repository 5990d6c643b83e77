//! Configuration schema — typed sections for the LLM endpoint, session
//! behavior, transcripts, data lookups, and the bootstrap server.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.voxflow/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub llm: LlmConfig,
    pub session: SessionConfig,
    pub transcripts: TranscriptsConfig,
    pub lookup: LookupConfig,
    pub server: ServerConfig,
}

// ─────────────────────────────────────────────
// LLM endpoint
// ─────────────────────────────────────────────

/// Settings for the LLM turn-loop endpoint (OpenAI-compatible).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmConfig {
    /// Model identifier sent with each request.
    pub model: String,
    /// API key for Bearer authentication.
    #[serde(default)]
    pub api_key: String,
    /// API base URL (e.g. `"https://api.openai.com/v1"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Maximum tokens to generate per response.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0). The original voice bots run cool.
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            api_key: String::new(),
            api_base: None,
            max_tokens: 1024,
            temperature: 0.3,
        }
    }
}

impl LlmConfig {
    /// Whether an API key is configured.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

// ─────────────────────────────────────────────
// Session behavior
// ─────────────────────────────────────────────

/// Per-session engine settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Flow to run when a bootstrap request doesn't name one.
    pub default_flow: String,
    /// Seconds to wait after the closing utterance before ending the session.
    pub grace_delay_secs: u64,
    /// Maximum tool dispatches per turn before forcing a spoken response.
    pub max_tool_rounds: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_flow: "shawarma".to_string(),
            grace_delay_secs: 5,
            max_tool_rounds: 8,
        }
    }
}

// ─────────────────────────────────────────────
// Transcripts
// ─────────────────────────────────────────────

/// Transcript persistence settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptsConfig {
    /// Whether finished sessions are written to disk.
    pub enabled: bool,
    /// Directory for transcript files. Empty = `~/.voxflow/transcripts/`.
    #[serde(default)]
    pub dir: String,
}

impl Default for TranscriptsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: String::new(),
        }
    }
}

// ─────────────────────────────────────────────
// Data lookups
// ─────────────────────────────────────────────

/// External data-lookup settings (weather and friends).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LookupConfig {
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

// ─────────────────────────────────────────────
// Bootstrap server
// ─────────────────────────────────────────────

/// HTTP bootstrap server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Listen address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Base URL used to mint room join credentials.
    pub room_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8910,
            room_base_url: "https://rooms.voxflow.local".to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
