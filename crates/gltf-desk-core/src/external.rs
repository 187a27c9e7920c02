//! Handing the active model to a viewer outside this process.
//!
//! A configured command line is split with shell-word rules. `{file}` in any
//! argument is replaced by the model path; without a placeholder the path is
//! appended as the last argument. With no command configured the platform
//! default opener is used.

use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;

const FILE_PLACEHOLDER: &str = "{file}";

#[derive(Error, Debug)]
pub enum ExternalError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid viewer command: {0}")]
    InvalidCommand(String),

    #[error("Failed to launch viewer: {0}")]
    Launch(#[from] std::io::Error),
}

/// Build the command that opens `path` with `command_line`.
pub fn build_viewer_command(command_line: &str, path: &Path) -> Result<Command, ExternalError> {
    let parts = shlex::split(command_line)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ExternalError::InvalidCommand(command_line.to_string()))?;

    let file = path.to_string_lossy();
    let mut substituted = false;
    let args: Vec<String> = parts[1..]
        .iter()
        .map(|arg| {
            if arg.contains(FILE_PLACEHOLDER) {
                substituted = true;
                arg.replace(FILE_PLACEHOLDER, &file)
            } else {
                arg.clone()
            }
        })
        .collect();

    let mut cmd = Command::new(&parts[0]);
    cmd.args(&args);
    if !substituted {
        cmd.arg(path);
    }
    Ok(cmd)
}

/// Open `path` in an external viewer without waiting for it to exit.
pub fn open_in_external_viewer(path: &Path, command_line: Option<&str>) -> Result<(), ExternalError> {
    if !path.is_file() {
        return Err(ExternalError::FileNotFound(path.display().to_string()));
    }

    match command_line.map(str::trim).filter(|c| !c.is_empty()) {
        Some(command_line) => {
            let mut cmd = build_viewer_command(command_line, path)?;
            cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
            let mut child = cmd.spawn()?;
            log::info!(
                "Opened {} with '{}' (pid {})",
                path.display(),
                command_line,
                child.id()
            );
            // Reap the viewer when it exits so it does not linger as a zombie.
            std::thread::spawn(move || {
                let _ = child.wait();
            });
        }
        None => {
            open::that_detached(path)?;
            log::info!("Opened {} with the system viewer", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    fn args_of(cmd: &Command) -> Vec<&OsStr> {
        cmd.get_args().collect()
    }

    #[test]
    fn appends_path_without_placeholder() {
        let cmd = build_viewer_command("f3d --up +Z", Path::new("/m/car.glb")).unwrap();
        assert_eq!(cmd.get_program(), "f3d");
        assert_eq!(args_of(&cmd), vec!["--up", "+Z", "/m/car.glb"]);
    }

    #[test]
    fn substitutes_placeholder() {
        let cmd = build_viewer_command("blender --python-expr 'load(\"{file}\")'", Path::new("/m/a.glb"))
            .unwrap();
        assert_eq!(args_of(&cmd), vec!["--python-expr", "load(\"/m/a.glb\")"]);
    }

    #[test]
    fn quoted_program_path() {
        let cmd = build_viewer_command("\"/Applications/My Viewer\" -x", Path::new("/m/a.glb")).unwrap();
        assert_eq!(cmd.get_program(), "/Applications/My Viewer");
    }

    #[test]
    fn rejects_unbalanced_quotes() {
        let err = build_viewer_command("viewer 'oops", Path::new("/m/a.glb")).unwrap_err();
        assert!(matches!(err, ExternalError::InvalidCommand(_)));
    }

    #[test]
    fn rejects_empty_command() {
        assert!(matches!(
            build_viewer_command("   ", Path::new("/m/a.glb")),
            Err(ExternalError::InvalidCommand(_))
        ));
    }

    #[test]
    fn missing_file_is_not_launched() {
        let err = open_in_external_viewer(Path::new("/no/such.glb"), Some("true")).unwrap_err();
        assert!(matches!(err, ExternalError::FileNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn spawns_configured_command() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.glb");
        std::fs::write(&path, b"glTF").unwrap();
        open_in_external_viewer(&path, Some("true")).unwrap();
    }
}
