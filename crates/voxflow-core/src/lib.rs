//! Voxflow core — shared types and services for the dialogue flow runtime.
//!
//! This crate contains:
//! - **types**: transcript messages, tool-call requests, and the LLM wire format
//! - **context**: the per-session conversation context (transcript + advertised tools)
//! - **events**: the typed events crossing the audio-transport boundary
//! - **transcript**: end-of-session transcript persistence
//! - **config**: configuration schema, loading, and env var overrides

pub mod config;
pub mod context;
pub mod events;
pub mod transcript;
pub mod types;
pub mod utils;

pub use context::{ContextSnapshot, ConversationContext};
pub use events::{EngineEvent, TransportEvent};
pub use transcript::TranscriptStore;
pub use types::{LlmResponse, Message, Role, ToolCallRequest, ToolDefinition};
