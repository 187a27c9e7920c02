//! WebSocket handler for session event streaming.
//!
//! Renderers connect to `/ws/events` and receive session events, including
//! the `renderer:command` instructions (clear, reset view, wireframe).
//! Clients can optionally send subscription filters.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use gltf_desk_core::SessionEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::AppState;

/// Subscription request from client.
#[derive(Deserialize)]
struct SubscriptionRequest {
    /// Event pattern to subscribe to (supports wildcards like "model:*").
    subscribe: String,
}

/// Unsubscription request from client.
#[derive(Deserialize)]
struct UnsubscriptionRequest {
    unsubscribe: String,
}

/// WebSocket event message sent to client.
#[derive(Serialize)]
struct WsEvent {
    /// Event type (e.g., "scene:changed").
    event_type: &'static str,
    payload: serde_json::Value,
}

impl WsEvent {
    fn from_session_event(event: &SessionEvent) -> Self {
        Self {
            event_type: event.event_type(),
            payload: serde_json::to_value(event).unwrap_or_default(),
        }
    }
}

/// Handler for GET /ws/events
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let subscriptions: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

    let mut event_rx = state.session.events().subscribe();

    let subs_clone = Arc::clone(&subscriptions);
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(req) = serde_json::from_str::<SubscriptionRequest>(&text) {
                    subs_clone.lock().unwrap().insert(req.subscribe);
                    log::debug!("WebSocket subscribed to pattern");
                } else if let Ok(req) = serde_json::from_str::<UnsubscriptionRequest>(&text) {
                    subs_clone.lock().unwrap().remove(&req.unsubscribe);
                    log::debug!("WebSocket unsubscribed from pattern");
                }
            }
        }
    });

    let send_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    let should_send = {
                        let subs = subscriptions.lock().unwrap();
                        // No subscriptions means everything.
                        subs.is_empty()
                            || subs
                                .iter()
                                .any(|pattern| matches_pattern(event.event_type(), pattern))
                    };

                    if should_send {
                        let ws_event = WsEvent::from_session_event(&event);
                        if let Ok(json) = serde_json::to_string(&ws_event) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break; // Client disconnected
                            }
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(count)) => {
                    log::warn!("WebSocket client lagged by {} events", count);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::select! {
        _ = recv_task => {},
        _ = send_task => {},
    }

    log::debug!("WebSocket connection closed");
}

/// Check if an event type matches a subscription pattern.
///
/// Supports wildcards:
/// - `*` matches any single segment
/// - Pattern ending with `:*` matches any suffix
fn matches_pattern(event_type: &str, pattern: &str) -> bool {
    if event_type == pattern || pattern == "*" {
        return true;
    }

    if let Some(prefix) = pattern.strip_suffix(":*") {
        if event_type.starts_with(prefix) && event_type[prefix.len()..].starts_with(':') {
            return true;
        }
    }

    if pattern.contains('*') {
        let pattern_parts: Vec<&str> = pattern.split(':').collect();
        let event_parts: Vec<&str> = event_type.split(':').collect();

        if pattern_parts.len() != event_parts.len() {
            return false;
        }

        return pattern_parts
            .iter()
            .zip(event_parts.iter())
            .all(|(p, e)| *p == "*" || p == e);
    }

    false
}
