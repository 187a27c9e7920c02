//! # gltf-desk-core
//!
//! Core session logic for gltf-desk, the desktop controller for viewing
//! GLTF/GLB models in a browser-based renderer.
//!
//! This crate is framework-agnostic and can be used by:
//! - the desktop controller binary (UI thread, native dialogs)
//! - the HTTP model server (per-request handlers)
//!
//! ## Key Concepts
//!
//! - **ModelFile**: an absolute path to a model plus its display metadata
//! - **ModelRegistry**: the known files of a viewing session and the active one
//! - **DialogBroker**: lets any thread ask the UI thread for a file dialog
//! - **SessionController**: owns session state and fans out notifications

pub mod assets;
pub mod capture;
pub mod config;
pub mod dialog;
pub mod event_bus;
pub mod external;
pub mod model;
pub mod registry;
pub mod renderer;
pub mod session;

// Re-export commonly used types
pub use assets::{AssetError, ResolvedAsset, StaticAssetResolver};
pub use capture::{CaptureError, CaptureRequest, SavedCapture};
pub use config::{BrokerConfig, ServerConfig};
pub use dialog::{
    DialogBroker, DialogError, DialogMode, DialogPrompt, FilePicker, FileTypeFilter, TickOutcome,
};
pub use event_bus::{EventBus, SessionEvent};
pub use model::{LoadOrigin, ModelFile, ModelFormat, ModelStats};
pub use registry::ModelRegistry;
pub use renderer::{BrowserRenderer, RendererError, RendererKind, RendererSession};
pub use session::{viewer_url, ServerState, SessionController, SessionError, SessionSnapshot};
