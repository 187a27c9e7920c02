//! Shared state for the model server.
//!
//! Injected into every handler; nothing here is a process-wide singleton.

use std::sync::Arc;

use gltf_desk_core::{DialogBroker, ServerConfig, SessionController, StaticAssetResolver};

use crate::cache::StaticCache;

/// Shared state available to all HTTP handlers.
pub struct AppState {
    pub session: Arc<SessionController>,
    pub assets: StaticAssetResolver,
    pub cache: StaticCache,
    /// Model files are streamed in chunks of this many bytes.
    pub chunk_size: usize,
    /// `None` when no desktop UI can show dialogs (headless, tests).
    pub dialogs: Option<Arc<DialogBroker>>,
}

impl AppState {
    pub fn new(session: Arc<SessionController>, config: &ServerConfig) -> Self {
        Self {
            session,
            assets: StaticAssetResolver::new(config.asset_root.clone()),
            cache: StaticCache::new(),
            chunk_size: config.chunk_size.max(1),
            dialogs: None,
        }
    }

    pub fn with_dialogs(mut self, dialogs: Arc<DialogBroker>) -> Self {
        self.dialogs = Some(dialogs);
        self
    }
}
