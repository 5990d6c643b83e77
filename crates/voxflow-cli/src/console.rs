//! Console transport — a development stand-in for the audio boundary.
//!
//! Stdin lines play the role of transcribed caller utterances; engine
//! utterances print as the bot's speech. A dedicated thread runs the
//! blocking readline loop and forwards lines over a channel so the async
//! side can select between caller input and engine output.

use std::sync::Arc;

use anyhow::Result;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;
use tracing::debug;

use voxflow_bots::{run_session, SessionKind};
use voxflow_core::config::Config;
use voxflow_core::events::{EngineEvent, TransportEvent};
use voxflow_providers::LlmProvider;

use crate::helpers;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

/// Run one console session to completion.
pub async fn run(kind: SessionKind, provider: Arc<dyn LlmProvider>, config: Config) -> Result<()> {
    helpers::print_banner(kind.as_str());

    let session_id = format!("console-{}", chrono::Utc::now().format("%Y%m%d-%H%M%S"));
    let (in_tx, in_rx) = mpsc::channel::<TransportEvent>(32);
    let (out_tx, mut out_rx) = mpsc::channel::<EngineEvent>(64);

    let session = tokio::spawn(async move {
        run_session(kind, provider, &config, &session_id, out_tx, in_rx).await
    });

    let mut lines = spawn_readline_thread();
    let mut hung_up = false;

    loop {
        tokio::select! {
            event = out_rx.recv() => match event {
                Some(EngineEvent::Speak { text }) => helpers::print_bot(&text),
                Some(EngineEvent::Ended) | None => {
                    println!();
                    println!("Call ended.");
                    break;
                }
            },
            line = lines.recv(), if !hung_up => match line {
                Some(text) if is_exit_command(&text) => {
                    debug!("caller hung up");
                    let _ = in_tx.send(TransportEvent::Disconnected).await;
                    hung_up = true;
                }
                Some(text) => {
                    let _ = in_tx.send(TransportEvent::utterance(text)).await;
                }
                None => {
                    let _ = in_tx.send(TransportEvent::Disconnected).await;
                    hung_up = true;
                }
            },
        }
    }

    session.abort();
    Ok(())
}

/// Run the blocking readline loop on its own thread.
fn spawn_readline_thread() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);

    std::thread::spawn(move || {
        let mut editor = match DefaultEditor::new() {
            Ok(e) => e,
            Err(e) => {
                eprintln!("Input error: {e}");
                return;
            }
        };

        loop {
            match editor.readline("You: ") {
                Ok(line) => {
                    let trimmed = line.trim().to_string();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(&line);
                    if tx.blocking_send(trimmed).is_err() {
                        break;
                    }
                }
                // Ctrl-C / Ctrl-D — hang up by closing the channel
                Err(_) => break,
            }
        }
    });

    rx
}

/// Check if input is an exit command.
fn is_exit_command(input: &str) -> bool {
    let lower = input.to_lowercase();
    EXIT_COMMANDS.contains(&lower.as_str())
}
