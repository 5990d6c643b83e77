//! Conversation context — the append-only transcript plus the currently
//! advertised tool set.
//!
//! One context per session, owned by the flow engine. The advertised tool
//! set is held behind an `Arc` so replacing it is a single pointer store:
//! a snapshot taken before the swap keeps the complete old set, a snapshot
//! taken after sees the complete new set, and no reader can ever observe a
//! half-updated mix.

use std::sync::Arc;

use crate::types::{Message, ToolDefinition};

/// The per-session conversation state handed to the LLM turn loop.
pub struct ConversationContext {
    /// Ordered transcript. Append-only: nothing reorders or deletes.
    transcript: Vec<Message>,
    /// The tool set currently advertised to the model.
    tools: Arc<[ToolDefinition]>,
}

impl ConversationContext {
    /// Create an empty context with no advertised tools.
    pub fn new() -> Self {
        ConversationContext {
            transcript: Vec::new(),
            tools: Arc::from(Vec::new()),
        }
    }

    /// Append a message to the end of the transcript.
    pub fn append(&mut self, message: Message) {
        self.transcript.push(message);
    }

    /// Atomically replace the advertised tool set.
    ///
    /// The previous set stays alive inside any snapshot that still holds it.
    pub fn set_tools(&mut self, tools: Arc<[ToolDefinition]>) {
        self.tools = tools;
    }

    /// The full transcript, in conversation order.
    pub fn messages(&self) -> &[Message] {
        &self.transcript
    }

    /// Number of transcript messages.
    pub fn len(&self) -> usize {
        self.transcript.len()
    }

    /// Whether the transcript is empty.
    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }

    /// The currently advertised tool set.
    pub fn active_tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Whether a tool name is in the active set.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.function.name == name)
    }

    /// Take an immutable view of the context for one turn-loop submission.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            messages: self.transcript.clone(),
            tools: self.tools.clone(),
        }
    }
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable view of the context at one instant: the transcript so far
/// and the tool set that was active when the snapshot was taken.
#[derive(Clone)]
pub struct ContextSnapshot {
    pub messages: Vec<Message>,
    pub tools: Arc<[ToolDefinition]>,
}
