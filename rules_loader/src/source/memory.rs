//! In-memory content source.

use std::collections::BTreeMap;

use super::{normalize_path, ContentDescriptor, ContentSource};
use crate::error::SourceError;

/// A vault held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: BTreeMap<String, String>,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a document.
    pub fn insert(&mut self, path: impl AsRef<str>, text: impl Into<String>) {
        self.files.insert(normalize_path(path.as_ref()), text.into());
    }

    /// Builder form of [`MemorySource::insert`].
    pub fn with_file(mut self, path: impl AsRef<str>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    /// Remove a document.
    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.files.remove(&normalize_path(path))
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if the source holds no documents.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl ContentSource for MemorySource {
    fn describe(&self, path: &str) -> Option<ContentDescriptor> {
        let path = normalize_path(path);
        self.files
            .contains_key(&path)
            .then(|| ContentDescriptor::new(path))
    }

    fn read_all(&self, descriptor: &ContentDescriptor) -> Result<String, SourceError> {
        self.files
            .get(&descriptor.path)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(descriptor.path.clone()))
    }

    fn list_all(&self) -> Vec<ContentDescriptor> {
        self.files.keys().map(ContentDescriptor::new).collect()
    }
}
