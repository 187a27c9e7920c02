//! SessionController - owns the session and fans out notifications.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use thiserror::Error;

use super::state::{LoadedEntry, ServerState, Session};
use crate::event_bus::{EventBus, SessionEvent};
use crate::model::{LoadOrigin, ModelFile, ModelStats};
use crate::registry::ModelRegistry;
use crate::renderer::{RendererError, RendererSession};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("Export folder does not exist: {}", .0.display())]
    ExportFolderMissing(PathBuf),

    #[error("Invalid server transition: {from} -> {to}")]
    InvalidTransition { from: ServerState, to: ServerState },

    #[error(transparent)]
    Renderer(#[from] RendererError),
}

/// Point-in-time copy of the session for status displays.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub active: Option<ModelFile>,
    pub loaded: Vec<LoadedEntry>,
    pub export_folder: Option<PathBuf>,
    pub last_stats: Option<ModelStats>,
    pub last_error: Option<String>,
    pub server_state: ServerState,
    pub server_port: Option<u16>,
}

/// Renderer navigation URL for the model server on `port`.
///
/// The active file travels in the `file` query parameter; the server never
/// rewrites the entry document.
pub fn viewer_url(port: u16, active: Option<&ModelFile>) -> String {
    match active {
        Some(file) => format!(
            "http://localhost:{}/index.html?file={}",
            port,
            urlencoding::encode(&file.url_path())
        ),
        None => format!("http://localhost:{}/index.html", port),
    }
}

/// Shared entry point for everything that changes the viewing session.
///
/// Cheap to share behind an `Arc`. Locks are never held across file I/O,
/// renderer calls or event publication. Changes touching both the registry
/// and the session take the session lock first and the registry lock inside
/// it.
pub struct SessionController {
    registry: Arc<ModelRegistry>,
    session: Mutex<Session>,
    events: Arc<EventBus>,
    renderer: RwLock<Option<Arc<dyn RendererSession>>>,
}

impl SessionController {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self::with_registry(Arc::new(ModelRegistry::new()), events)
    }

    pub fn with_registry(registry: Arc<ModelRegistry>, events: Arc<EventBus>) -> Self {
        Self {
            registry,
            session: Mutex::new(Session::new()),
            events,
            renderer: RwLock::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn attach_renderer(&self, renderer: Arc<dyn RendererSession>) {
        log::info!("Renderer attached: {:?}", renderer.kind());
        *self.renderer.write().unwrap() = Some(renderer);
    }

    pub fn renderer(&self) -> Option<Arc<dyn RendererSession>> {
        self.renderer.read().unwrap().clone()
    }

    /// Validate `path`, register it and make it the active file.
    pub fn load_file(&self, path: &Path, origin: LoadOrigin) -> Result<ModelFile, SessionError> {
        if !path.exists() {
            return Err(SessionError::FileNotFound(path.to_path_buf()));
        }
        let file = ModelFile::from_path(path).map_err(|e| {
            log::debug!("Rejected {}: {}", path.display(), e);
            SessionError::NotAFile(path.to_path_buf())
        })?;
        Ok(self.load_model(file, origin))
    }

    /// Make an already-validated file the active one.
    pub fn load_model(&self, file: ModelFile, origin: LoadOrigin) -> ModelFile {
        let file = {
            let mut session = self.session.lock().unwrap();
            let file = self.registry.register_active(file);
            session.record_load(file.clone(), origin);
            file
        };

        log::info!("Loaded {} ({})", file.display_name(), origin);
        self.events.publish(SessionEvent::SceneChanged {
            file_name: file.display_name().to_string(),
            origin,
        });
        file
    }

    pub fn active_file(&self) -> Option<ModelFile> {
        self.registry.active()
    }

    pub fn loaded_entries(&self) -> Vec<LoadedEntry> {
        self.session.lock().unwrap().loaded.clone()
    }

    /// Reset to an empty session and tell the renderer to drop its scene.
    pub fn clear(&self) {
        {
            let mut session = self.session.lock().unwrap();
            self.registry.clear();
            session.reset();
        }
        self.events.publish(SessionEvent::SessionCleared);

        if let Some(renderer) = self.renderer() {
            if let Err(e) = renderer.clear() {
                log::warn!("Renderer did not clear: {}", e);
            }
        }
    }

    /// Renderer reported a successful load.
    pub fn report_model_stats(&self, stats: ModelStats) {
        self.session.lock().unwrap().last_stats = Some(stats.clone());
        log::info!("{}", stats.summary());
        self.events.publish(SessionEvent::ModelLoaded {
            file_name: self.active_file().map(|f| f.display_name().to_string()),
            stats,
        });
    }

    /// Renderer reported a failed load. The active file stays set so the
    /// user can retry.
    pub fn report_model_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.session.lock().unwrap().last_error = Some(message.clone());
        log::warn!("Renderer error: {}", message);
        self.events.publish(SessionEvent::ModelError { message });
    }

    pub fn reset_view(&self) -> Result<(), SessionError> {
        let renderer = self.renderer().ok_or(RendererError::NotAttached)?;
        Ok(renderer.reset_view()?)
    }

    pub fn toggle_wireframe(&self) -> Result<(), SessionError> {
        let renderer = self.renderer().ok_or(RendererError::NotAttached)?;
        Ok(renderer.toggle_wireframe()?)
    }

    pub fn set_export_folder(&self, folder: &Path) -> Result<PathBuf, SessionError> {
        if !folder.is_dir() {
            return Err(SessionError::ExportFolderMissing(folder.to_path_buf()));
        }
        let folder = folder.to_path_buf();
        self.session.lock().unwrap().export_folder = Some(folder.clone());
        self.publish_status(format!("Export folder: {}", folder.display()));
        Ok(folder)
    }

    pub fn export_folder(&self) -> Option<PathBuf> {
        self.session.lock().unwrap().export_folder.clone()
    }

    pub fn publish_status(&self, message: impl Into<String>) {
        self.events.publish(SessionEvent::Status {
            message: message.into(),
        });
    }

    pub fn server_state(&self) -> ServerState {
        self.session.lock().unwrap().server_state
    }

    pub fn server_port(&self) -> Option<u16> {
        self.session.lock().unwrap().server_port
    }

    /// Move the server state machine forward. Skipped or backward moves are
    /// rejected and leave the state untouched.
    pub fn transition_server(&self, to: ServerState, port: Option<u16>) -> Result<(), SessionError> {
        {
            let mut session = self.session.lock().unwrap();
            let from = session.server_state;
            if !from.can_transition_to(to) {
                return Err(SessionError::InvalidTransition { from, to });
            }
            session.server_state = to;
            session.server_port = match to {
                ServerState::Stopped => None,
                _ => port,
            };
        }
        log::debug!("Server {} (port {:?})", to, port);
        self.events.publish(SessionEvent::ServerState {
            state: to,
            port: if to == ServerState::Stopped { None } else { port },
        });
        Ok(())
    }

    /// URL the renderer should open, if the server is up.
    pub fn viewer_url(&self) -> Option<String> {
        let port = self.server_port()?;
        Some(viewer_url(port, self.active_file().as_ref()))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let active = self.active_file();
        let session = self.session.lock().unwrap();
        SessionSnapshot {
            active,
            loaded: session.loaded.clone(),
            export_folder: session.export_folder.clone(),
            last_stats: session.last_stats.clone(),
            last_error: session.last_error.clone(),
            server_state: session.server_state,
            server_port: session.server_port,
        }
    }
}
