//! Viewing session: which files are loaded, where captures go, and the
//! model server's lifecycle state.
//!
//! All mutation goes through [`SessionController`], which is shared by the
//! UI thread and the HTTP handlers.

mod controller;
mod state;

pub use controller::{viewer_url, SessionController, SessionError, SessionSnapshot};
pub use state::{LoadedEntry, ServerState, Session};
