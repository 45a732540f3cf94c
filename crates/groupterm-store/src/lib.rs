//! groupterm-store: durable storage for the group hierarchy and preferences.
//!
//! State is written as pretty-printed UTF-8 JSON to a fixed path under the
//! per-application data directory. Persistence is best-effort by contract:
//! save failures are logged and swallowed, and a missing or corrupt file
//! loads as "no saved state" so the caller can fall back to bootstrap
//! defaults.

pub mod schema;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub use schema::{ColorScheme, PersistedGroup, PersistedState, PersistedTab, Preferences};

const APP_DIR: &str = "groupterm";
const STATE_FILE: &str = "state.json";

/// Serializes and deserializes the hierarchy to its on-disk location.
///
/// The file is a single shared resource: only the coordinating thread may
/// save through a given store.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store at the standard per-app path, e.g.
    /// `~/.local/share/groupterm/state.json` on Linux.
    pub fn at_default_location() -> Self {
        let base = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: base.join(APP_DIR).join(STATE_FILE),
        }
    }

    /// Store at an explicit path. Tests point this at a temp directory.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the state file, creating intermediate directories as needed.
    /// Failures are logged, never propagated.
    pub fn save(&self, state: &PersistedState) {
        if let Err(e) = self.try_save(state) {
            log::warn!("failed to save state to {}: {e}", self.path.display());
        }
    }

    fn try_save(&self, state: &PersistedState) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state).map_err(io::Error::other)?;
        fs::write(&self.path, json)?;
        log::debug!("state saved to {}", self.path.display());
        Ok(())
    }

    /// Read the state file back. Returns `None` when the file is absent,
    /// unreadable, or corrupt.
    pub fn load(&self) -> Option<PersistedState> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    log::warn!("failed to read state from {}: {e}", self.path.display());
                }
                return None;
            }
        };
        match serde_json::from_str(&data) {
            Ok(state) => Some(state),
            Err(e) => {
                log::warn!("discarding corrupt state file {}: {e}", self.path.display());
                None
            }
        }
    }
}
