//! Session notifications fanned out to every interested consumer.
//!
//! The desktop controller shows them in its status line; the HTTP server
//! forwards them to renderers over `/ws/events`.
//!
//! # Example
//!
//! ```rust
//! use gltf_desk_core::event_bus::{EventBus, SessionEvent};
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.publish(SessionEvent::Status { message: "Ready".into() });
//!
//! let event = rx.try_recv().unwrap();
//! assert_eq!(event.event_type(), "status");
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{LoadOrigin, ModelStats};

/// Events beyond this many unread ones make slow subscribers lag.
const DEFAULT_CAPACITY: usize = 256;

/// Instruction sent to the active renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererCommand {
    /// Drop the loaded scene and any cached visual state.
    Clear,
    ResetView,
    ToggleWireframe,
}

/// Everything the session tells the outside world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A file became the active one.
    #[serde(rename_all = "camelCase")]
    SceneChanged {
        file_name: String,
        origin: LoadOrigin,
    },
    /// The renderer finished loading the active file.
    #[serde(rename_all = "camelCase")]
    ModelLoaded {
        file_name: Option<String>,
        stats: ModelStats,
    },
    /// The renderer failed to load the active file.
    ModelError { message: String },
    SessionCleared,
    RendererCommand { command: RendererCommand },
    ServerState {
        state: crate::session::ServerState,
        port: Option<u16>,
    },
    /// Free-form status line text.
    Status { message: String },
}

impl SessionEvent {
    /// Routing key used for subscription patterns (`scene:changed`, ...).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SceneChanged { .. } => "scene:changed",
            Self::ModelLoaded { .. } => "model:loaded",
            Self::ModelError { .. } => "model:error",
            Self::SessionCleared => "session:cleared",
            Self::RendererCommand { .. } => "renderer:command",
            Self::ServerState { .. } => "server:state",
            Self::Status { .. } => "status",
        }
    }
}

/// Broadcast channel for [`SessionEvent`]s.
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Returns how many received it;
    /// with no subscribers the event is dropped.
    pub fn publish(&self, event: SessionEvent) -> usize {
        log::debug!("event {}", event.event_type());
        self.sender.send(event).unwrap_or(0)
    }

    /// Receive all future events. Past events are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
