//! ModelRegistry - the set of model files known to a viewing session.
//!
//! Shared between the UI thread and HTTP handler threads. Every operation
//! takes the single internal lock once, so readers never observe a
//! half-applied update.

use std::path::Path;
use std::sync::RwLock;

use crate::model::ModelFile;

#[derive(Default)]
struct RegistryState {
    /// Known files in insertion order, unique by path.
    files: Vec<ModelFile>,
    /// Index into `files` of the active entry.
    active: Option<usize>,
}

/// Thread-safe registry of model files.
#[derive(Default)]
pub struct ModelRegistry {
    state: RwLock<RegistryState>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file. Idempotent by path: if an entry with the same path
    /// exists it is returned untouched and the active file does not change.
    pub fn register(&self, file: ModelFile) -> ModelFile {
        let mut state = self.state.write().unwrap();
        if let Some(existing) = state.files.iter().find(|f| f.path() == file.path()) {
            return existing.clone();
        }
        state.files.push(file.clone());
        file
    }

    /// Register `file` and make it active in one step.
    pub fn register_active(&self, file: ModelFile) -> ModelFile {
        let mut state = self.state.write().unwrap();
        let index = match state.files.iter().position(|f| f.path() == file.path()) {
            Some(index) => index,
            None => {
                state.files.push(file);
                state.files.len() - 1
            }
        };
        state.active = Some(index);
        state.files[index].clone()
    }

    /// Mark a known path as active. Returns false if the path is unknown.
    pub fn set_active(&self, path: &Path) -> bool {
        let mut state = self.state.write().unwrap();
        match state.files.iter().position(|f| f.path() == path) {
            Some(index) => {
                state.active = Some(index);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, path: &Path) -> Option<ModelFile> {
        let state = self.state.read().unwrap();
        state.files.iter().find(|f| f.path() == path).cloned()
    }

    /// Look up a known file by its basename, as used by `/model/<name>`.
    ///
    /// When several known files share a basename the active one wins, then
    /// the most recently registered.
    pub fn find_by_name(&self, name: &str) -> Option<ModelFile> {
        let state = self.state.read().unwrap();
        if let Some(active) = state.active.map(|i| &state.files[i]) {
            if active.display_name() == name {
                return Some(active.clone());
            }
        }
        state
            .files
            .iter()
            .rev()
            .find(|f| f.display_name() == name)
            .cloned()
    }

    pub fn active(&self) -> Option<ModelFile> {
        let state = self.state.read().unwrap();
        state.active.map(|i| state.files[i].clone())
    }

    /// Snapshot of known files in insertion order.
    pub fn list_known(&self) -> Vec<ModelFile> {
        self.state.read().unwrap().files.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every file and deactivate.
    pub fn clear(&self) {
        let mut state = self.state.write().unwrap();
        state.files.clear();
        state.active = None;
    }
}
