//! Action executor — runs the side-effecting actions attached to a node,
//! independent of tool calls.
//!
//! Announce emits a fixed utterance on the outbound channel; precondition
//! checks are log-only; terminate hands back a grace delay which the
//! engine turns into a [`TerminationTimer`]. The timer is spawned by and
//! reports back to the owning engine over a oneshot channel, and can be
//! cancelled through a `Notify` when termination is already in progress on
//! another path.

use std::sync::Arc;

use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::Sender;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info};

use voxflow_core::events::EngineEvent;

use crate::graph::{Action, Node};

/// Executes pre/post node actions and schedules termination.
pub struct ActionExecutor {
    outbound: Sender<EngineEvent>,
}

impl ActionExecutor {
    /// Create an executor that emits on `outbound`.
    pub fn new(outbound: Sender<EngineEvent>) -> Self {
        ActionExecutor { outbound }
    }

    /// Emit an utterance to the transport.
    ///
    /// The send is awaited, so anything emitted afterwards on the same
    /// channel is observed later by the transport.
    pub async fn speak(&self, text: &str) -> Result<(), SendError<EngineEvent>> {
        self.outbound.send(EngineEvent::speak(text)).await
    }

    /// Emit the end-of-session signal.
    pub async fn end_session(&self) -> Result<(), SendError<EngineEvent>> {
        self.outbound.send(EngineEvent::Ended).await
    }

    /// Run a node's pre-actions in declaration order.
    pub async fn run_pre_actions(&self, node: &Node) -> Result<(), SendError<EngineEvent>> {
        for action in &node.pre_actions {
            match action {
                Action::Announce { text } => self.speak(text).await?,
                Action::PreconditionCheck { name } => {
                    info!(check = %name, node = %node.id, "precondition check passed");
                }
                // Rejected at graph construction; nothing to do here
                Action::Terminate { .. } => {
                    debug!(node = %node.id, "ignoring terminate in pre-actions");
                }
            }
        }
        Ok(())
    }

    /// Run a node's post-actions in declaration order.
    ///
    /// Returns the grace delay if a terminate action was present. The
    /// announce that precedes it has already been flushed onto the channel
    /// by the time this returns, which is what guarantees the caller hears
    /// the goodbye before the session closes.
    pub async fn run_post_actions(&self, node: &Node) -> Result<Option<u64>, SendError<EngineEvent>> {
        let mut grace = None;
        for action in &node.post_actions {
            match action {
                Action::Announce { text } => self.speak(text).await?,
                Action::PreconditionCheck { name } => {
                    info!(check = %name, node = %node.id, "precondition check passed");
                }
                Action::Terminate { grace_secs } => {
                    info!(grace_secs = grace_secs, node = %node.id, "termination scheduled");
                    grace = Some(*grace_secs);
                }
            }
        }
        Ok(grace)
    }

    /// Arm the termination timer.
    pub fn schedule_termination(&self, grace_secs: u64) -> TerminationTimer {
        TerminationTimer::spawn(grace_secs)
    }
}

// ─────────────────────────────────────────────
// Termination timer
// ─────────────────────────────────────────────

/// A one-shot timer for the end-of-session grace delay.
///
/// Owned by the engine that armed it; fires over a oneshot channel and is
/// cancelled via `Notify` if the session terminates through another path
/// first, so the end signal can never be emitted twice.
pub struct TerminationTimer {
    due: oneshot::Receiver<()>,
    cancel: Arc<Notify>,
}

impl TerminationTimer {
    fn spawn(grace_secs: u64) -> Self {
        let (tx, rx) = oneshot::channel();
        let cancel = Arc::new(Notify::new());
        let cancelled = cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs(grace_secs)) => {
                    let _ = tx.send(());
                }
                _ = cancelled.notified() => {}
            }
        });

        TerminationTimer { due: rx, cancel }
    }

    /// Wait for the grace delay. Returns `false` if the timer was cancelled
    /// instead of firing.
    pub async fn elapsed(&mut self) -> bool {
        (&mut self.due).await.is_ok()
    }

    /// Cancel the pending timer.
    ///
    /// `notify_one` stores a permit, so cancellation lands even if the
    /// timer task hasn't been polled yet.
    pub fn cancel(&self) {
        self.cancel.notify_one();
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
