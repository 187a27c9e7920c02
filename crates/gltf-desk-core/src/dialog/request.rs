//! What a dialog request asks the UI thread to show.

use serde::{Deserialize, Serialize};

/// Why the dialog is being opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogMode {
    /// Replace the current model.
    Open,
    /// Add a model next to the ones already loaded.
    Add,
}

impl DialogMode {
    pub fn default_title(self) -> &'static str {
        match self {
            Self::Open => "Open GLTF/GLB File",
            Self::Add => "Add GLTF/GLB File",
        }
    }
}

/// One entry of the dialog's file-type dropdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTypeFilter {
    pub label: String,
    /// Glob patterns such as `*.gltf`.
    pub patterns: Vec<String>,
}

impl FileTypeFilter {
    /// Build from a label and a space-separated pattern set (`"*.gltf *.glb"`).
    pub fn new(label: impl Into<String>, patterns: &str) -> Self {
        Self {
            label: label.into(),
            patterns: patterns.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// Extensions named by `*.ext` patterns; wildcard-only patterns are skipped.
    pub fn extensions(&self) -> Vec<&str> {
        self.patterns
            .iter()
            .filter_map(|p| p.strip_prefix("*."))
            .filter(|ext| !ext.is_empty() && *ext != "*")
            .collect()
    }

    /// The filters offered when the caller does not supply any.
    pub fn model_defaults() -> Vec<FileTypeFilter> {
        vec![
            Self::new("GLTF files", "*.gltf *.glb"),
            Self::new("GLTF files", "*.gltf"),
            Self::new("GLB files", "*.glb"),
            Self::new("All files", "*.*"),
        ]
    }
}

/// Everything the UI thread needs to render the dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogPrompt {
    pub mode: DialogMode,
    pub title: String,
    pub filters: Vec<FileTypeFilter>,
}

impl DialogPrompt {
    /// Prompt with default title and model filters for `mode`.
    pub fn new(mode: DialogMode) -> Self {
        Self {
            mode,
            title: mode.default_title().to_string(),
            filters: FileTypeFilter::model_defaults(),
        }
    }

    /// Override the title; `None` or blank keeps the default.
    pub fn with_title(mut self, title: Option<String>) -> Self {
        if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
            self.title = title;
        }
        self
    }

    /// Override the filters; `None` or empty keeps the defaults.
    pub fn with_filters(mut self, filters: Option<Vec<FileTypeFilter>>) -> Self {
        if let Some(filters) = filters.filter(|f| !f.is_empty()) {
            self.filters = filters;
        }
        self
    }
}
