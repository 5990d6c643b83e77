//! Config loader — reads `~/.voxflow/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.voxflow/config.json`
//! 3. Environment variables `VOXFLOW_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let config: Config = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `VOXFLOW_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `VOXFLOW_LLM__MODEL` → `llm.model`
/// - `VOXFLOW_LLM__API_KEY` → `llm.api_key`
/// - `VOXFLOW_LLM__API_BASE` → `llm.api_base`
/// - `VOXFLOW_LLM__MAX_TOKENS` → `llm.max_tokens`
/// - `VOXFLOW_LLM__TEMPERATURE` → `llm.temperature`
/// - `VOXFLOW_SESSION__DEFAULT_FLOW` → `session.default_flow`
/// - `VOXFLOW_SESSION__GRACE_DELAY_SECS` → `session.grace_delay_secs`
/// - `VOXFLOW_LOOKUP__TIMEOUT_SECS` → `lookup.timeout_secs`
/// - `VOXFLOW_SERVER__HOST` / `VOXFLOW_SERVER__PORT` → `server.*`
fn apply_env_overrides(mut config: Config) -> Config {
    // LLM endpoint
    if let Ok(val) = std::env::var("VOXFLOW_LLM__MODEL") {
        config.llm.model = val;
    }
    if let Ok(val) = std::env::var("VOXFLOW_LLM__API_KEY") {
        config.llm.api_key = val;
    }
    if let Ok(val) = std::env::var("VOXFLOW_LLM__API_BASE") {
        config.llm.api_base = Some(val);
    }
    if let Ok(val) = std::env::var("VOXFLOW_LLM__MAX_TOKENS") {
        if let Ok(n) = val.parse::<u32>() {
            config.llm.max_tokens = n;
        }
    }
    if let Ok(val) = std::env::var("VOXFLOW_LLM__TEMPERATURE") {
        if let Ok(t) = val.parse::<f64>() {
            config.llm.temperature = t;
        }
    }

    // Session
    if let Ok(val) = std::env::var("VOXFLOW_SESSION__DEFAULT_FLOW") {
        config.session.default_flow = val;
    }
    if let Ok(val) = std::env::var("VOXFLOW_SESSION__GRACE_DELAY_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            config.session.grace_delay_secs = n;
        }
    }

    // Lookups
    if let Ok(val) = std::env::var("VOXFLOW_LOOKUP__TIMEOUT_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            config.lookup.timeout_secs = n;
        }
    }

    // Server
    if let Ok(val) = std::env::var("VOXFLOW_SERVER__HOST") {
        config.server.host = val;
    }
    if let Ok(val) = std::env::var("VOXFLOW_SERVER__PORT") {
        if let Ok(p) = val.parse::<u16>() {
            config.server.port = p;
        }
    }

    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
