//! StaticAssetResolver - maps request paths onto the renderer's asset root.
//!
//! Resolution is sandboxed: a request can only ever produce a path inside the
//! asset root. Missing codec helpers are substituted from a fixed alias table
//! so that renderer builds looking for differently named Draco decoder files
//! still find the one that ships.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Requested basename -> shipped file that provides the same module.
///
/// Only consulted when the requested file does not exist.
const DECODER_ALIASES: &[(&str, &str)] = &[
    ("draco_wasm_wrapper.js", "draco_decoder_gltf.js"),
    ("draco wasm wrapper.js", "draco_decoder_gltf.js"),
    ("draco_decoder.js", "draco_decoder_gltf.js"),
    ("draco_decoder.wasm", "draco_decoder_gltf.wasm"),
];

/// Extensions whose contents may be memoized after the first read.
const CACHEABLE_EXTENSIONS: &[&str] = &["js", "css", "wasm", "json"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("Asset not found: {requested} (resolved: {resolved})")]
    NotFound { requested: String, resolved: String },

    /// The request tried to leave the asset root.
    #[error("Forbidden asset path")]
    Forbidden,

    /// Browser housekeeping request (e.g. `.well-known/...`).
    #[error("Probe path")]
    Probe,
}

/// A request path successfully mapped onto a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub path: PathBuf,
    pub content_type: &'static str,
    /// Whether the bytes may be memoized in-process.
    pub cacheable: bool,
    /// Set when a decoder alias was substituted for a missing file.
    pub aliased_from: Option<String>,
}

/// Resolves request paths against a sandboxed asset root.
#[derive(Debug, Clone)]
pub struct StaticAssetResolver {
    root: PathBuf,
}

impl StaticAssetResolver {
    /// Create a resolver for `root`. The root is canonicalized when possible
    /// so symlink escapes can be detected.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The renderer's entry document.
    pub fn index_path(&self) -> PathBuf {
        self.root.join("index.html")
    }

    /// Resolve a raw request path (without query string).
    pub fn resolve(&self, request_path: &str) -> Result<ResolvedAsset, AssetError> {
        let normalized = request_path.replace('\\', "/");
        let normalized = normalized.trim_start_matches('/');
        let decoded = match urlencoding::decode(normalized) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => return Err(self.miss(request_path, normalized)),
        };
        // Decoding may reintroduce backslashes or leading slashes.
        let decoded = decoded.replace('\\', "/");
        let decoded = decoded.trim_start_matches('/');

        if is_probe_path(decoded) {
            return Err(AssetError::Probe);
        }

        let relative = sanitize_relative(decoded).ok_or(AssetError::Forbidden)?;
        let candidate = self.root.join(&relative);
        let candidate = self.confine(candidate)?;

        if candidate.is_file() {
            return Ok(self.found(candidate, None));
        }

        if let Some(alias) = self.decoder_alias(&candidate) {
            let requested = candidate
                .file_name()
                .map(|n| n.to_string_lossy().into_owned());
            log::debug!(
                "Serving decoder alias {} for {}",
                alias.display(),
                request_path
            );
            return Ok(self.found(alias, requested));
        }

        Err(self.miss(request_path, &candidate.to_string_lossy()))
    }

    fn found(&self, path: PathBuf, aliased_from: Option<String>) -> ResolvedAsset {
        ResolvedAsset {
            content_type: content_type_for(&path),
            cacheable: is_cacheable(&path),
            path,
            aliased_from,
        }
    }

    fn miss(&self, requested: &str, resolved: &str) -> AssetError {
        let lower = requested.to_ascii_lowercase();
        if !lower.contains("devtools") && !lower.contains("favicon.ico") {
            log::warn!("File not found: {} (requested: {})", resolved, requested);
        }
        AssetError::NotFound {
            requested: requested.to_string(),
            resolved: resolved.to_string(),
        }
    }

    /// Reject paths that leave the root once symlinks are followed.
    fn confine(&self, candidate: PathBuf) -> Result<PathBuf, AssetError> {
        match std::fs::canonicalize(&candidate) {
            Ok(real) if real.starts_with(&self.root) => Ok(real),
            Ok(_) => Err(AssetError::Forbidden),
            // Does not exist (yet); the lexical check already confined it.
            Err(_) => Ok(candidate),
        }
    }

    /// Find the shipped decoder standing in for a missing one, looking next
    /// to the requested file first and then at the asset root.
    fn decoder_alias(&self, missing: &Path) -> Option<PathBuf> {
        let name = missing.file_name()?.to_str()?;
        let (_, substitute) = DECODER_ALIASES
            .iter()
            .find(|(requested, _)| *requested == name)?;

        let beside = missing.parent().map(|dir| dir.join(substitute));
        let at_root = self.root.join(substitute);
        beside
            .into_iter()
            .chain(std::iter::once(at_root))
            .find(|p| p.is_file())
            .and_then(|p| self.confine(p).ok())
    }
}

/// Lexically normalize a relative request path, refusing anything that
/// would climb above the root or name an absolute location.
fn sanitize_relative(path: &str) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(clean)
}

fn is_probe_path(path: &str) -> bool {
    path.starts_with(".well-known/") || path == ".well-known" || path.contains("/.well-known/")
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Content type from the extension alone; contents are never sniffed.
pub fn content_type_for(path: &Path) -> &'static str {
    match extension_of(path).as_deref() {
        Some("js") | Some("mjs") => "application/javascript",
        Some("css") => "text/css",
        Some("html") | Some("htm") => "text/html",
        Some("wasm") => "application/wasm",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Markup is never cached; scripts, styles, wasm and json are.
pub fn is_cacheable(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| CACHEABLE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}
