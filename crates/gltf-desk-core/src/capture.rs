//! Persisting renderer screenshots into the export folder.
//!
//! Layout: `<export>/<file>.png`, or `<export>/<part>/<file>.png` when the
//! renderer names the part being photographed.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Positional words that make a good short filename, in priority order.
const POSITION_KEYWORDS: &[&str] = &[
    "Front", "Rear", "Back", "Left", "Right", "Top", "Bottom", "Upper", "Lower", "Inner", "Outer",
    "Side", "Center", "Middle",
];

const UNNAMED_PART: &str = "unnamed_part";

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Export folder not set or does not exist")]
    NoExportFolder,

    #[error("{0}")]
    InvalidPayload(String),

    #[error("{0}")]
    WriteFailure(String),
}

impl CaptureError {
    /// HTTP status the capture route answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoExportFolder | Self::InvalidPayload(_) => 400,
            Self::WriteFailure(_) => 500,
        }
    }
}

/// Body of `POST /api/capture-image`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureRequest {
    /// Base64 PNG, optionally as a `data:` URL.
    pub image_data: String,
    pub part_name: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedCapture {
    pub file_path: PathBuf,
    pub file_name: String,
}

/// Replace characters that are unsafe in directory names and trim. Names
/// made only of dots would address the export folder or its parent.
pub fn sanitize_part_name(part_name: &str) -> String {
    let safe: String = part_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    let safe = safe.trim();
    if safe.chars().all(|c| c == '.') {
        UNNAMED_PART.to_string()
    } else {
        safe.to_string()
    }
}

/// First positional keyword appearing as a whole word in `part_name`.
pub fn short_name_for_part(part_name: &str) -> Option<&'static str> {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        POSITION_KEYWORDS
            .iter()
            .filter_map(|k| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(k)))
                    .ok()
                    .map(|re| (*k, re))
            })
            .collect()
    });
    patterns
        .iter()
        .find(|(_, re)| re.is_match(part_name))
        .map(|(keyword, _)| *keyword)
}

/// Decode the image payload, stripping a `data:...;base64,` prefix.
pub fn decode_image_data(image_data: &str) -> Result<Vec<u8>, CaptureError> {
    if image_data.trim().is_empty() {
        return Err(CaptureError::InvalidPayload("No image data in request".into()));
    }
    let encoded = match image_data.split_once(',') {
        Some((_, data)) => data,
        None => image_data,
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| CaptureError::InvalidPayload(format!("Failed to decode image: {}", e)))
}

/// Last path component of a caller-supplied filename, or `None` if nothing
/// usable remains.
fn explicit_file_name(filename: Option<&str>) -> Option<String> {
    let name = filename?.trim();
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

fn timestamped_file_name() -> String {
    format!(
        "model-capture_{}.png",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    )
}

/// Decide where a capture goes, relative to the export folder.
fn capture_target(export_folder: &Path, request: &CaptureRequest) -> (PathBuf, String) {
    let explicit = explicit_file_name(request.filename.as_deref());
    match request.part_name.as_deref().filter(|p| !p.is_empty()) {
        Some(part_name) => {
            let folder = export_folder.join(sanitize_part_name(part_name));
            let file_name = explicit.unwrap_or_else(|| {
                let short = short_name_for_part(part_name)
                    .map(str::to_string)
                    .unwrap_or_else(|| sanitize_part_name(part_name));
                format!("{}.png", short)
            });
            (folder, file_name)
        }
        None => (
            export_folder.to_path_buf(),
            explicit.unwrap_or_else(timestamped_file_name),
        ),
    }
}

/// True if `path` is `root` followed only by plain components.
fn stays_inside(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root).is_ok_and(|rest| {
        rest.components()
            .all(|c| matches!(c, std::path::Component::Normal(_)))
    })
}

/// Decode and write a capture. Nothing is created on disk unless the
/// payload decodes.
pub fn save_capture(
    export_folder: Option<&Path>,
    request: &CaptureRequest,
) -> Result<SavedCapture, CaptureError> {
    let export_folder = export_folder
        .filter(|f| f.is_dir())
        .ok_or(CaptureError::NoExportFolder)?;
    let bytes = decode_image_data(&request.image_data)?;

    let (folder, file_name) = capture_target(export_folder, request);
    if !stays_inside(export_folder, &folder.join(&file_name)) {
        return Err(CaptureError::InvalidPayload(format!(
            "Invalid capture path: {}",
            folder.join(&file_name).display()
        )));
    }
    if folder != export_folder {
        fs::create_dir_all(&folder).map_err(|e| {
            CaptureError::WriteFailure(format!("Failed to create part folder: {}", e))
        })?;
        log::debug!("Created part folder: {}", folder.display());
    }

    let file_path = folder.join(&file_name);
    fs::write(&file_path, &bytes)
        .map_err(|e| CaptureError::WriteFailure(format!("Failed to save image: {}", e)))?;
    log::info!("Saved capture {} ({} bytes)", file_path.display(), bytes.len());

    Ok(SavedCapture {
        file_path,
        file_name,
    })
}
