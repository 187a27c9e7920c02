//! In-process memo of static asset bytes.
//!
//! Only assets the resolver marks cacheable are stored; the entry document
//! is always read fresh.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use axum::body::Bytes;

#[derive(Default)]
pub struct StaticCache {
    entries: Mutex<HashMap<PathBuf, Bytes>>,
}

impl StaticCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<Bytes> {
        self.entries.lock().unwrap().get(path).cloned()
    }

    pub fn insert(&self, path: PathBuf, bytes: Bytes) {
        self.entries.lock().unwrap().insert(path, bytes);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
