//! Session bootstrap HTTP API.
//!
//! Two endpoints, matching the contract the voice clients already speak:
//!
//! - `POST /sessions` with `{"sessionType": "shawarma"}` → spawns a session
//!   and returns `{"sessionId", "joinCredentials": {"roomUrl", "token"}}`
//! - `GET /sessions/{id}/status` → `{"state": "running" | "finished"}`
//!
//! The core consumes only `sessionType`, to select which flow graph to
//! instantiate; everything else about the transport happens outside this
//! process.

pub mod supervisor;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use voxflow_bots::SessionKind;
use voxflow_core::config::Config;
use voxflow_providers::LlmProvider;

pub use supervisor::{JoinCredentials, SessionStatus, SessionSupervisor, StartedSession, TransportHandle};

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionRequest {
    #[serde(default)]
    session_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionResponse {
    session_id: String,
    join_credentials: JoinCredentials,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    state: SessionStatus,
}

// ─────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────

/// Build the bootstrap router.
pub fn build_router(supervisor: Arc<SessionSupervisor>) -> Router {
    Router::new()
        .route("/sessions", post(start_session))
        .route("/sessions/{id}/status", get(session_status))
        .with_state(supervisor)
}

/// Start the bootstrap server (runs until the process stops).
pub async fn serve(config: Config, provider: Arc<dyn LlmProvider>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let supervisor = Arc::new(SessionSupervisor::new(config, provider));
    let router = build_router(supervisor);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "bootstrap server listening");
    axum::serve(listener, router).await?;
    Ok(())
}

// ─────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────

async fn start_session(
    State(supervisor): State<Arc<SessionSupervisor>>,
    Json(request): Json<StartSessionRequest>,
) -> Result<Json<StartSessionResponse>, (StatusCode, String)> {
    let kind = match request.session_type.as_deref() {
        Some(raw) => SessionKind::parse(raw).ok_or_else(|| {
            warn!(session_type = raw, "unknown session type");
            (
                StatusCode::BAD_REQUEST,
                format!("unknown sessionType '{raw}'"),
            )
        })?,
        None => supervisor.default_kind(),
    };

    let started = supervisor.start_session(kind).await;
    Ok(Json(StartSessionResponse {
        session_id: started.session_id,
        join_credentials: started.credentials,
    }))
}

async fn session_status(
    State(supervisor): State<Arc<SessionSupervisor>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, StatusCode> {
    match supervisor.status(&id).await {
        Some(state) => Ok(Json(StatusResponse { state })),
        None => Err(StatusCode::NOT_FOUND),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use voxflow_core::types::{LlmResponse, Message, ToolDefinition};
    use voxflow_providers::LlmRequestConfig;

    struct GreeterProvider;

    #[async_trait]
    impl LlmProvider for GreeterProvider {
        async fn chat(
            &self,
            _messages: &[Message],
            _tools: Option<&[ToolDefinition]>,
            _model: &str,
            _config: &LlmRequestConfig,
        ) -> LlmResponse {
            LlmResponse {
                content: Some("Hello!".into()),
                ..Default::default()
            }
        }

        fn default_model(&self) -> &str {
            "test-model"
        }

        fn display_name(&self) -> &str {
            "GreeterProvider"
        }
    }

    /// Bind the router on an ephemeral port and return its base URL.
    async fn spawn_server() -> (String, Arc<SessionSupervisor>) {
        let mut config = Config::default();
        config.transcripts.enabled = false;
        let supervisor = Arc::new(SessionSupervisor::new(config, Arc::new(GreeterProvider)));
        let router = build_router(supervisor.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        (format!("http://{addr}"), supervisor)
    }

    #[tokio::test]
    async fn test_start_session_returns_credentials() {
        let (base, supervisor) = spawn_server().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/sessions"))
            .json(&serde_json::json!({"sessionType": "shawarma"}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        let session_id = body["sessionId"].as_str().unwrap();
        assert!(!session_id.is_empty());
        assert!(body["joinCredentials"]["roomUrl"]
            .as_str()
            .unwrap()
            .contains(session_id));
        assert!(!body["joinCredentials"]["token"].as_str().unwrap().is_empty());

        assert_eq!(
            supervisor.kind(session_id).await,
            Some(SessionKind::Shawarma)
        );
    }

    #[tokio::test]
    async fn test_start_session_defaults_flow() {
        let (base, supervisor) = spawn_server().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/sessions"))
            .json(&serde_json::json!({}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        let session_id = body["sessionId"].as_str().unwrap();
        assert_eq!(supervisor.kind(session_id).await, Some(SessionKind::Shawarma));
    }

    #[tokio::test]
    async fn test_start_session_rejects_unknown_type() {
        let (base, _supervisor) = spawn_server().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/sessions"))
            .json(&serde_json::json!({"sessionType": "karaoke"}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_status_running_then_finished() {
        let (base, supervisor) = spawn_server().await;
        let client = reqwest::Client::new();

        let body: serde_json::Value = client
            .post(format!("{base}/sessions"))
            .json(&serde_json::json!({"sessionType": "intake"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let session_id = body["sessionId"].as_str().unwrap().to_string();

        let status: serde_json::Value = client
            .get(format!("{base}/sessions/{session_id}/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["state"], "running");

        supervisor.cancel(&session_id).await;
        for _ in 0..100 {
            let status: serde_json::Value = client
                .get(format!("{base}/sessions/{session_id}/status"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            if status["state"] == "finished" {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("session never reported finished");
    }

    #[tokio::test]
    async fn test_status_unknown_session_is_404() {
        let (base, _supervisor) = spawn_server().await;
        let resp = reqwest::get(format!("{base}/sessions/not-a-session/status"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }
}
