//! Model file metadata and renderer statistics.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// On-disk representation of a GLTF scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// JSON form (`.gltf`).
    Gltf,
    /// Binary container (`.glb`).
    Glb,
    /// Anything else the user picked through an "All files" filter.
    Other,
}

impl ModelFormat {
    /// Detect the format from a path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("gltf") => Self::Gltf,
            Some("glb") => Self::Glb,
            _ => Self::Other,
        }
    }

    /// MIME type used when streaming the model to the renderer.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Gltf => "model/gltf+json",
            Self::Glb => "model/gltf-binary",
            Self::Other => "application/octet-stream",
        }
    }
}

/// A model file known to the viewing session.
///
/// Identity is the absolute path. Instances are immutable; re-reading the
/// file produces a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelFile {
    path: PathBuf,
    display_name: String,
    size_bytes: u64,
}

impl ModelFile {
    /// Build a ModelFile without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        let path = path.into();
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            display_name,
            size_bytes,
        }
    }

    /// Stat an existing file and build its ModelFile.
    ///
    /// The path is canonicalized so that two spellings of the same file share
    /// one identity.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let path = fs::canonicalize(path)?;
        let metadata = fs::metadata(&path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Not a file: {}", path.display()),
            ));
        }
        Ok(Self::new(path, metadata.len()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn format(&self) -> ModelFormat {
        ModelFormat::from_path(&self.path)
    }

    /// Route under which the HTTP server exposes this file.
    pub fn url_path(&self) -> String {
        format!("/model/{}", self.display_name)
    }
}

/// Format a byte count the way the status bar shows it.
pub fn format_file_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if size < KB {
        format!("{} B", size)
    } else if size < MB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{:.2} MB", size as f64 / MB as f64)
    }
}

/// Format an integer with `,` thousands separators (12345 -> "12,345").
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Which actor asked for a file to be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadOrigin {
    /// The desktop controller (toolbar, startup arguments).
    Desktop,
    /// The renderer, through the add-model API.
    Renderer,
}

impl std::fmt::Display for LoadOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Desktop => write!(f, "Desktop"),
            Self::Renderer => write!(f, "Browser"),
        }
    }
}

/// Statistics the renderer reports after a successful load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelStats {
    pub vertices: u64,
    pub faces: u64,
    pub materials: u64,
    pub textures: u64,
    pub animations: u64,
    pub is_draco: bool,
}

impl ModelStats {
    /// One-line summary for the status bar.
    pub fn summary(&self) -> String {
        format!(
            "Model loaded: {} vertices, {} faces",
            format_count(self.vertices),
            format_count(self.faces)
        )
    }
}
