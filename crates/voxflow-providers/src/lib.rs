//! LLM provider layer for Voxflow.
//!
//! # Architecture
//!
//! - [`traits::LlmProvider`] — the turn-loop boundary the flow engine talks to
//! - [`http_provider::HttpProvider`] — generic OpenAI-compatible HTTP client

pub mod http_provider;
pub mod traits;

// Re-export main types for convenience
pub use http_provider::HttpProvider;
pub use traits::{LlmProvider, LlmRequestConfig};
