//! Session supervisor — spawns one engine task per session and tracks
//! completion.
//!
//! Each session is independent: its own task, its own transport channel
//! pair, its own record. The supervisor holds the transport handle until a
//! transport attaches, reports running/finished through a `watch` channel,
//! and cancels a session by delivering `Disconnected` to its engine.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{error, info};
use uuid::Uuid;

use voxflow_bots::{run_session, SessionKind};
use voxflow_core::config::Config;
use voxflow_core::events::{EngineEvent, TransportEvent};
use voxflow_providers::LlmProvider;

/// Buffer sizes for the per-session channels.
const INBOUND_BUFFER: usize = 32;
const OUTBOUND_BUFFER: usize = 64;

/// Lifecycle of a supervised session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Finished,
}

/// Credentials a client uses to join the session's room.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinCredentials {
    pub room_url: String,
    pub token: String,
}

/// The transport side of a session's channels.
pub struct TransportHandle {
    /// Feed transcribed utterances (and disconnects) to the engine.
    pub inbound: mpsc::Sender<TransportEvent>,
    /// Receive the engine's utterances and the end-of-session signal.
    pub outbound: mpsc::Receiver<EngineEvent>,
}

/// A freshly started session.
pub struct StartedSession {
    pub session_id: String,
    pub credentials: JoinCredentials,
}

struct SessionEntry {
    kind: SessionKind,
    status: watch::Receiver<SessionStatus>,
    inbound: mpsc::Sender<TransportEvent>,
    /// Parked until a transport attaches.
    transport: Option<TransportHandle>,
}

/// Owns all sessions of one server process.
pub struct SessionSupervisor {
    config: Config,
    provider: Arc<dyn LlmProvider>,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionSupervisor {
    /// Create a supervisor.
    pub fn new(config: Config, provider: Arc<dyn LlmProvider>) -> Self {
        SessionSupervisor {
            config,
            provider,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// The flow used when a bootstrap request names none.
    pub fn default_kind(&self) -> SessionKind {
        SessionKind::parse(&self.config.session.default_flow).unwrap_or(SessionKind::Shawarma)
    }

    /// Start a session: spawn its engine task and mint join credentials.
    pub async fn start_session(&self, kind: SessionKind) -> StartedSession {
        let session_id = Uuid::new_v4().to_string();
        let (in_tx, in_rx) = mpsc::channel(INBOUND_BUFFER);
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (status_tx, status_rx) = watch::channel(SessionStatus::Running);

        let config = self.config.clone();
        let provider = self.provider.clone();
        let id = session_id.clone();
        tokio::spawn(async move {
            if let Err(e) = run_session(kind, provider, &config, &id, out_tx, in_rx).await {
                error!(session = %id, error = %e, "session task failed");
            }
            let _ = status_tx.send(SessionStatus::Finished);
        });

        let credentials = JoinCredentials {
            room_url: format!(
                "{}/{}",
                self.config.server.room_base_url.trim_end_matches('/'),
                session_id
            ),
            token: Uuid::new_v4().simple().to_string(),
        };

        let entry = SessionEntry {
            kind,
            status: status_rx,
            inbound: in_tx.clone(),
            transport: Some(TransportHandle {
                inbound: in_tx,
                outbound: out_rx,
            }),
        };

        info!(session = %session_id, kind = %kind, "session started");
        self.sessions.write().await.insert(session_id.clone(), entry);

        StartedSession {
            session_id,
            credentials,
        }
    }

    /// Take the parked transport handle for a session (first caller wins).
    pub async fn attach_transport(&self, session_id: &str) -> Option<TransportHandle> {
        self.sessions
            .write()
            .await
            .get_mut(session_id)
            .and_then(|entry| entry.transport.take())
    }

    /// Current status of a session.
    pub async fn status(&self, session_id: &str) -> Option<SessionStatus> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|entry| *entry.status.borrow())
    }

    /// The flow a session runs.
    pub async fn kind(&self, session_id: &str) -> Option<SessionKind> {
        self.sessions.read().await.get(session_id).map(|e| e.kind)
    }

    /// Cancel a session by delivering a disconnect to its engine.
    ///
    /// Returns `false` for unknown sessions. Cancelling a finished session
    /// is a no-op.
    pub async fn cancel(&self, session_id: &str) -> bool {
        let sessions = self.sessions.read().await;
        match sessions.get(session_id) {
            Some(entry) => {
                let _ = entry.inbound.send(TransportEvent::Disconnected).await;
                true
            }
            None => false,
        }
    }

    /// Number of known sessions (running and finished).
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions are known.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
