//! Transport boundary events — what crosses between a session's engine and
//! its audio transport.
//!
//! The transport (room join, audio frames, VAD, STT, TTS) lives outside
//! this codebase. Each session owns a private pair of `tokio::sync::mpsc`
//! channels carrying these events; nothing is routed across sessions.

/// An event from the transport into the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// A transcribed user utterance.
    Utterance { text: String },
    /// The participant left or the transport dropped. The engine abandons
    /// in-flight work and ends the session immediately.
    Disconnected,
}

/// An event from the engine out to the transport.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// An utterance to synthesize and play to the caller.
    Speak { text: String },
    /// End of session. Always the last event; sent exactly once.
    Ended,
}

impl TransportEvent {
    /// Convenience constructor for an utterance event.
    pub fn utterance(text: impl Into<String>) -> Self {
        TransportEvent::Utterance { text: text.into() }
    }
}

impl EngineEvent {
    /// Convenience constructor for a speak event.
    pub fn speak(text: impl Into<String>) -> Self {
        EngineEvent::Speak { text: text.into() }
    }
}
