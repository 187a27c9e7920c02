//! Controller commands, one per line on stdin.
//!
//! Stands in for the desktop toolbar: every button maps to one command.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Load a model from a path.
    Open(PathBuf),
    /// Pick a model with the native dialog.
    Browse,
    /// Pick an additional model with the native dialog.
    Add,
    Clear,
    /// Start the server if needed and open the viewer in the browser.
    Browser,
    Stop,
    /// Set the export folder; without a path a folder dialog is shown.
    Export(Option<PathBuf>),
    /// Open the active model in the external viewer.
    External,
    Status,
    Reset,
    Wireframe,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  open <path>     load a model file
  browse          choose a model with a file dialog
  add             add a model with a file dialog
  clear           clear the scene
  browser         open the viewer in the browser
  stop            stop the model server
  export [dir]    set the folder for captured images
  external        open the active model in the external viewer
  status          show session status
  reset           reset the camera
  wireframe       toggle wireframe
  quit            exit";

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let words = shlex::split(line).ok_or_else(|| format!("Unbalanced quotes: {}", line.trim()))?;
    let Some((name, args)) = words.split_first() else {
        return Ok(None);
    };

    let command = match (name.to_ascii_lowercase().as_str(), args) {
        ("open", [path]) => Command::Open(PathBuf::from(path)),
        ("open", _) => return Err("Usage: open <path>".to_string()),
        ("browse", []) => Command::Browse,
        ("add", []) => Command::Add,
        ("clear", []) => Command::Clear,
        ("browser", []) => Command::Browser,
        ("stop", []) => Command::Stop,
        ("export", []) => Command::Export(None),
        ("export", [dir]) => Command::Export(Some(PathBuf::from(dir))),
        ("external", []) => Command::External,
        ("status", []) => Command::Status,
        ("reset", []) => Command::Reset,
        ("wireframe", []) => Command::Wireframe,
        ("help", _) | ("?", _) => Command::Help,
        ("quit", []) | ("exit", []) => Command::Quit,
        (other, _) => return Err(format!("Unknown command: {} (try 'help')", other)),
    };
    Ok(Some(command))
}

/// Forward stdin lines to the UI thread. The reader thread ends at EOF.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("gltf-desk-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
            log::debug!("stdin closed");
        })
        .map_err(|e| log::error!("Failed to read commands from stdin: {}", e))
        .ok();
    rx
}
