//! Cross-thread file dialogs.
//!
//! Native dialogs may only run on the UI thread. Any other thread files a
//! request with the [`DialogBroker`] and blocks (bounded) until the UI thread
//! services it on its next tick.

mod broker;
mod request;

pub use broker::{DialogBroker, DialogError, FilePicker, TickOutcome};
pub use request::{DialogMode, DialogPrompt, FileTypeFilter};
