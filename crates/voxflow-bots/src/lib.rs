//! Voxflow bots — the concrete dialogue flows.
//!
//! This crate contains:
//! - **menu** / **order**: the shawarma menu and per-session order book
//! - **shawarma**: the five-stage phone-ordering flow
//! - **intake**: the birthday-gated patient intake flow
//! - **lookup**: the weather data-lookup collaborator
//!
//! [`run_session`] is the entry point used by the bootstrap server and the
//! CLI: it selects a flow by [`SessionKind`], builds an engine, and drives
//! the session to completion.

pub mod intake;
pub mod lookup;
pub mod menu;
pub mod order;
pub mod shawarma;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;

use voxflow_core::config::Config;
use voxflow_core::events::{EngineEvent, TransportEvent};
use voxflow_core::TranscriptStore;
use voxflow_flow::{EngineSettings, FlowEngine};
use voxflow_providers::LlmProvider;

use crate::intake::{intake_dispatcher, intake_flow, IntakeRecord, DEMO_BIRTHDAY};
use crate::lookup::WeatherLookup;
use crate::order::OrderBook;
use crate::shawarma::{shawarma_dispatcher, shawarma_flow};

/// Which dialogue flow a session runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionKind {
    /// Shawarma phone ordering.
    Shawarma,
    /// Patient intake with identity gate.
    Intake,
}

impl SessionKind {
    /// Parse a session-type string from the bootstrap request.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "shawarma" | "order" => Some(SessionKind::Shawarma),
            "intake" => Some(SessionKind::Intake),
            _ => None,
        }
    }

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Shawarma => "shawarma",
            SessionKind::Intake => "intake",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run one session to completion.
///
/// Builds the flow selected by `kind`, wires the transport channels, and
/// drives the engine until the flow terminates or the transport
/// disconnects.
pub async fn run_session(
    kind: SessionKind,
    provider: Arc<dyn LlmProvider>,
    config: &Config,
    session_id: &str,
    outbound: mpsc::Sender<EngineEvent>,
    mut inbound: mpsc::Receiver<TransportEvent>,
) -> anyhow::Result<()> {
    let settings = EngineSettings::from_config(config);
    let grace = config.session.grace_delay_secs;
    let store = transcript_store(config)?;

    info!(session = session_id, kind = %kind, "starting session");

    match kind {
        SessionKind::Shawarma => {
            let mut engine = FlowEngine::new(
                Arc::new(shawarma_flow(grace)),
                shawarma_dispatcher(),
                OrderBook::new(),
                session_id,
                outbound,
                settings,
                store,
            );
            engine.run(provider.as_ref(), &mut inbound).await?;
        }
        SessionKind::Intake => {
            let lookup = WeatherLookup::new(config.lookup.timeout_secs);
            let mut engine = FlowEngine::new(
                Arc::new(intake_flow(grace)),
                intake_dispatcher(DEMO_BIRTHDAY, lookup),
                IntakeRecord::default(),
                session_id,
                outbound,
                settings,
                store,
            );
            engine.run(provider.as_ref(), &mut inbound).await?;
        }
    }

    info!(session = session_id, "session finished");
    Ok(())
}

/// Build the transcript store if persistence is enabled.
fn transcript_store(config: &Config) -> anyhow::Result<Option<TranscriptStore>> {
    if !config.transcripts.enabled {
        return Ok(None);
    }
    let dir = if config.transcripts.dir.is_empty() {
        None
    } else {
        Some(PathBuf::from(&config.transcripts.dir))
    };
    let store = TranscriptStore::new(dir).context("failed to create transcript store")?;
    Ok(Some(store))
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use voxflow_core::types::{LlmResponse, Message, ToolDefinition};
    use voxflow_providers::LlmRequestConfig;

    struct ScriptedProvider {
        responses: Mutex<Vec<LlmResponse>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(
            &self,
            _messages: &[Message],
            _tools: Option<&[ToolDefinition]>,
            _model: &str,
            _config: &LlmRequestConfig,
        ) -> LlmResponse {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                LlmResponse {
                    content: Some("(script exhausted)".into()),
                    ..Default::default()
                }
            } else {
                responses.remove(0)
            }
        }

        fn default_model(&self) -> &str {
            "test-model"
        }

        fn display_name(&self) -> &str {
            "ScriptedProvider"
        }
    }

    #[test]
    fn test_session_kind_parse() {
        assert_eq!(SessionKind::parse("shawarma"), Some(SessionKind::Shawarma));
        assert_eq!(SessionKind::parse("order"), Some(SessionKind::Shawarma));
        assert_eq!(SessionKind::parse("intake"), Some(SessionKind::Intake));
        assert_eq!(SessionKind::parse("movie"), None);
    }

    #[test]
    fn test_session_kind_display() {
        assert_eq!(SessionKind::Shawarma.to_string(), "shawarma");
        assert_eq!(SessionKind::Intake.to_string(), "intake");
    }

    #[tokio::test]
    async fn test_run_session_ends_on_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.transcripts.dir = dir.path().to_str().unwrap().to_string();

        let provider = Arc::new(ScriptedProvider {
            responses: Mutex::new(vec![LlmResponse {
                content: Some("Hello, Shawarma Baladna!".into()),
                ..Default::default()
            }]),
        });

        let (out_tx, mut out_rx) = mpsc::channel(32);
        let (in_tx, in_rx) = mpsc::channel(8);
        in_tx.send(TransportEvent::Disconnected).await.unwrap();

        run_session(
            SessionKind::Shawarma,
            provider,
            &config,
            "lib-test",
            out_tx,
            in_rx,
        )
        .await
        .unwrap();

        assert_eq!(
            out_rx.recv().await.unwrap(),
            EngineEvent::speak("Hello, Shawarma Baladna!")
        );
        assert_eq!(out_rx.recv().await.unwrap(), EngineEvent::Ended);

        // The transcript was persisted into the configured directory
        let store = TranscriptStore::new(Some(dir.path().to_path_buf())).unwrap();
        assert!(!store.load("lib-test").unwrap().is_empty());
    }
}
