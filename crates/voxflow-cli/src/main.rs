//! Voxflow CLI — entry point.
//!
//! # Commands
//!
//! - `voxflow chat [--flow shawarma|intake]` — run a session against the
//!   console transport (stdin stands in for transcribed speech)
//! - `voxflow serve` — start the session bootstrap HTTP server

mod console;
mod helpers;

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use voxflow_bots::SessionKind;
use voxflow_core::config::{load_config, Config};
use voxflow_providers::HttpProvider;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Voxflow — voice-driven conversational flow runtime
#[derive(Parser)]
#[command(name = "voxflow", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a dialogue session on the console transport
    Chat {
        /// Flow to run ("shawarma" or "intake"); defaults to the config value
        #[arg(short, long)]
        flow: Option<String>,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Start the session bootstrap HTTP server
    Serve {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Chat { flow, logs } => {
            init_logging(logs);
            run_chat(flow).await
        }
        Commands::Serve { logs } => {
            init_logging(logs);
            run_serve().await
        }
    }
}

// ─────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────

async fn run_chat(flow: Option<String>) -> Result<()> {
    let config = prepare_config();
    let kind = resolve_kind(flow.as_deref(), &config)?;
    let provider = Arc::new(HttpProvider::from_config(&config.llm));

    if !config.llm.is_configured() {
        eprintln!("Warning: no LLM API key configured (set VOXFLOW_LLM__API_KEY).");
    }

    console::run(kind, provider, config).await
}

async fn run_serve() -> Result<()> {
    let config = prepare_config();
    let provider = Arc::new(HttpProvider::from_config(&config.llm));

    println!(
        "Voxflow bootstrap server on {}:{} (default flow: {})",
        config.server.host, config.server.port, config.session.default_flow
    );

    voxflow_server::serve(config, provider).await
}

/// Load config and expand `~` in the transcripts dir.
fn prepare_config() -> Config {
    let mut config = load_config(None);
    if !config.transcripts.dir.is_empty() {
        config.transcripts.dir = helpers::expand_tilde(&config.transcripts.dir)
            .to_string_lossy()
            .into_owned();
    }
    config
}

/// Resolve the flow from the CLI flag, falling back to config.
fn resolve_kind(flow: Option<&str>, config: &Config) -> Result<SessionKind> {
    let raw = flow.unwrap_or(&config.session.default_flow);
    match SessionKind::parse(raw) {
        Some(kind) => Ok(kind),
        None => bail!("unknown flow '{raw}' (expected \"shawarma\" or \"intake\")"),
    }
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("voxflow=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
