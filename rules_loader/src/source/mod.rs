//! Read-only access to the content vault.
//!
//! Paths are vault-relative and always use `/` as separator.

mod fs;
mod memory;

pub use fs::*;
pub use memory::*;

use serde::Serialize;

use crate::error::SourceError;

/// Identifies one document in a content source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContentDescriptor {
    pub path: String,

    /// File name without extension.
    pub name: String,
}

impl ContentDescriptor {
    /// Create a descriptor for a vault path.
    pub fn new(path: impl Into<String>) -> Self {
        let path = normalize_path(&path.into());
        let file_name = path.rsplit('/').next().unwrap_or_default();
        let name = match file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => file_name,
        };
        Self {
            name: name.to_string(),
            path,
        }
    }

    /// File extension, if any.
    pub fn extension(&self) -> Option<&str> {
        let file_name = self.path.rsplit('/').next()?;
        match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => Some(ext),
            _ => None,
        }
    }

    /// Check whether this document is a markdown note.
    pub fn is_markdown(&self) -> bool {
        self.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
    }
}

/// A hierarchical document store.
pub trait ContentSource: Send + Sync {
    /// Look up a document by exact path.
    fn describe(&self, path: &str) -> Option<ContentDescriptor>;

    /// Read a document's full text.
    fn read_all(&self, descriptor: &ContentDescriptor) -> Result<String, SourceError>;

    /// Every document in the store, sorted by path.
    fn list_all(&self) -> Vec<ContentDescriptor>;
}

/// Normalize a vault path: `/` separators, no leading or repeated slashes,
/// `.` and `..` segments folded.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
