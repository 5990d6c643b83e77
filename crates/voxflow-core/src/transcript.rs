//! Transcript persistence — one JSON document per finished session.
//!
//! # Disk format
//!
//! `~/.voxflow/transcripts/<session>.json`: an ordered JSON array of
//! `{"role": "...", "content": "..."}` objects. A trailing *system*
//! message is excluded from the persisted copy — the only way a session
//! can end on one is the engine's own procedural instruction (an end-node
//! wrap-up prompt or a corrective that was never answered), which is not
//! conversation.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::types::{Message, Role};
use crate::utils;

/// Writes finished session transcripts to disk.
pub struct TranscriptStore {
    /// Directory where `.json` transcript files are stored.
    dir: PathBuf,
}

impl TranscriptStore {
    /// Create a transcript store.
    ///
    /// `dir` defaults to `~/.voxflow/transcripts/` if `None`. The directory
    /// is created if it doesn't exist.
    pub fn new(dir: Option<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.unwrap_or_else(utils::get_transcripts_path);
        std::fs::create_dir_all(&dir)?;
        Ok(TranscriptStore { dir })
    }

    /// Persist a session transcript, returning the file path.
    ///
    /// Best-effort callers should log the error rather than fail the
    /// session teardown.
    pub fn save(&self, session_id: &str, messages: &[Message]) -> std::io::Result<PathBuf> {
        let persisted = persistable(messages);
        let path = self.transcript_path(session_id);

        let json = serde_json::to_string_pretty(persisted)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&path, json)?;

        debug!(
            session = session_id,
            messages = persisted.len(),
            path = %path.display(),
            "saved transcript"
        );
        Ok(path)
    }

    /// Best-effort save: logs on failure instead of returning it.
    pub fn save_best_effort(&self, session_id: &str, messages: &[Message]) {
        if let Err(e) = self.save(session_id, messages) {
            warn!(session = session_id, error = %e, "failed to persist transcript");
        }
    }

    /// Load a persisted transcript (used by tests and tooling).
    pub fn load(&self, session_id: &str) -> std::io::Result<Vec<Message>> {
        let path = self.transcript_path(session_id);
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// The JSON file path for a session id.
    pub fn transcript_path(&self, session_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", utils::safe_filename(session_id)))
    }

    /// The store's directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// The slice of a transcript that gets persisted: everything except a
/// trailing procedural system instruction.
fn persistable(messages: &[Message]) -> &[Message] {
    match messages.last() {
        Some(m) if m.role == Role::System => &messages[..messages.len() - 1],
        _ => messages,
    }
}
