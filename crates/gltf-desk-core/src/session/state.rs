//! Per-session state owned by the SessionController.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model::{LoadOrigin, ModelFile, ModelStats};

/// Lifecycle of the HTTP model server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
}

impl ServerState {
    /// Allowed moves are Stopped -> Starting -> Running -> Stopped.
    pub fn can_transition_to(self, next: ServerState) -> bool {
        matches!(
            (self, next),
            (Self::Stopped, Self::Starting)
                | (Self::Starting, Self::Running)
                | (Self::Running, Self::Stopped)
        )
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// One row of the "loaded files" list, tagged with who loaded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedEntry {
    pub file: ModelFile,
    pub origin: LoadOrigin,
}

/// Mutable session data. Always accessed under the controller's lock.
#[derive(Debug)]
pub struct Session {
    /// Loaded files in first-load order, unique by path.
    pub loaded: Vec<LoadedEntry>,
    pub export_folder: Option<PathBuf>,
    /// Outcome of the renderer's last load of the active file.
    pub last_stats: Option<ModelStats>,
    pub last_error: Option<String>,
    pub server_state: ServerState,
    pub server_port: Option<u16>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            loaded: Vec::new(),
            export_folder: None,
            last_stats: None,
            last_error: None,
            server_state: ServerState::Stopped,
            server_port: None,
        }
    }

    /// Record a load. A repeated path updates its entry in place.
    pub fn record_load(&mut self, file: ModelFile, origin: LoadOrigin) {
        match self.loaded.iter_mut().find(|e| e.file.path() == file.path()) {
            Some(entry) => {
                entry.file = file;
                entry.origin = origin;
            }
            None => self.loaded.push(LoadedEntry { file, origin }),
        }
        self.last_stats = None;
        self.last_error = None;
    }

    /// Forget loaded files and renderer outcomes. Export folder and server
    /// state belong to the desktop, not the scene, and survive.
    pub fn reset(&mut self) {
        self.loaded.clear();
        self.last_stats = None;
        self.last_error = None;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
