//! Renderer capability.
//!
//! The session never branches on which renderer is in use; it only calls the
//! shared contract below. Load outcomes travel the other way, through
//! [`SessionController::report_model_stats`](crate::SessionController::report_model_stats)
//! and `report_model_error`.

use std::io;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event_bus::{EventBus, RendererCommand, SessionEvent};

#[derive(Error, Debug)]
pub enum RendererError {
    #[error("Failed to open viewer: {0}")]
    Launch(#[from] io::Error),

    #[error("No renderer attached")]
    NotAttached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererKind {
    /// The system browser pointed at the local model server.
    Browser,
    /// A webview hosted inside the desktop window.
    Embedded,
    NativeGl,
}

/// What the session can ask of a renderer.
pub trait RendererSession: Send + Sync {
    fn kind(&self) -> RendererKind;

    /// Navigate the renderer to a viewer URL.
    fn show(&self, url: &str) -> Result<(), RendererError>;

    /// Drop the scene and any cached visual state.
    fn clear(&self) -> Result<(), RendererError>;

    fn reset_view(&self) -> Result<(), RendererError>;

    fn toggle_wireframe(&self) -> Result<(), RendererError>;
}

type Launcher = Box<dyn Fn(&str) -> io::Result<()> + Send + Sync>;

/// Renderer living in the user's browser.
///
/// Opening goes through the platform opener; every later instruction is a
/// `renderer:command` event that the page receives over `/ws/events`.
pub struct BrowserRenderer {
    events: Arc<EventBus>,
    launcher: Launcher,
}

impl BrowserRenderer {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self::with_launcher(events, |url| open::that_detached(url))
    }

    /// Use a custom way of opening URLs instead of the system browser.
    pub fn with_launcher<F>(events: Arc<EventBus>, launcher: F) -> Self
    where
        F: Fn(&str) -> io::Result<()> + Send + Sync + 'static,
    {
        Self {
            events,
            launcher: Box::new(launcher),
        }
    }

    fn send(&self, command: RendererCommand) -> Result<(), RendererError> {
        let delivered = self.events.publish(SessionEvent::RendererCommand { command });
        if delivered == 0 {
            log::debug!("No renderer listening for {:?}", command);
        }
        Ok(())
    }
}

impl RendererSession for BrowserRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::Browser
    }

    fn show(&self, url: &str) -> Result<(), RendererError> {
        log::info!("Opening viewer at {}", url);
        (self.launcher)(url)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), RendererError> {
        self.send(RendererCommand::Clear)
    }

    fn reset_view(&self) -> Result<(), RendererError> {
        self.send(RendererCommand::ResetView)
    }

    fn toggle_wireframe(&self) -> Result<(), RendererError> {
        self.send(RendererCommand::ToggleWireframe)
    }
}
