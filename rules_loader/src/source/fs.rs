//! Filesystem-backed content source.

use std::path::PathBuf;
use walkdir::WalkDir;

use super::{normalize_path, ContentDescriptor, ContentSource};
use crate::error::SourceError;

/// A vault rooted at a directory on disk.
///
/// Hidden files and directories (starting with `.`) are not listed.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    /// Create a source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        normalize_path(path)
            .split('/')
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }
}

impl ContentSource for FsSource {
    fn describe(&self, path: &str) -> Option<ContentDescriptor> {
        let path = normalize_path(path);
        if path.is_empty() {
            return None;
        }
        self.full_path(&path)
            .is_file()
            .then(|| ContentDescriptor::new(path))
    }

    fn read_all(&self, descriptor: &ContentDescriptor) -> Result<String, SourceError> {
        let full = self.full_path(&descriptor.path);
        std::fs::read_to_string(&full).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => SourceError::NotFound(descriptor.path.clone()),
            _ => SourceError::Io {
                path: descriptor.path.clone(),
                source,
            },
        })
    }

    fn list_all(&self) -> Vec<ContentDescriptor> {
        let mut descriptors: Vec<_> = WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&self.root).ok()?;
                let path: Vec<_> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                Some(ContentDescriptor::new(path.join("/")))
            })
            .collect();
        descriptors.sort();
        descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("systems/dnd")).unwrap();
        std::fs::create_dir_all(dir.path().join(".obsidian")).unwrap();
        std::fs::write(dir.path().join("systems/dnd/index.rhai"), "let system = 1;").unwrap();
        std::fs::write(dir.path().join("Goblin.md"), "# Goblin").unwrap();
        std::fs::write(dir.path().join(".obsidian/app.json"), "{}").unwrap();
        dir
    }

    #[test]
    fn test_describe_and_read() {
        let dir = vault();
        let source = FsSource::new(dir.path());

        let desc = source.describe("/systems//dnd/index.rhai").unwrap();
        assert_eq!(desc.path, "systems/dnd/index.rhai");
        assert_eq!(source.read_all(&desc).unwrap(), "let system = 1;");

        assert!(source.describe("systems/dnd").is_none());
        assert!(source.describe("missing.md").is_none());
    }

    #[test]
    fn test_list_skips_hidden() {
        let dir = vault();
        let source = FsSource::new(dir.path());
        let paths: Vec<_> = source.list_all().into_iter().map(|d| d.path).collect();
        assert_eq!(paths, vec!["Goblin.md", "systems/dnd/index.rhai"]);
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let dir = vault();
        let source = FsSource::new(dir.path());
        let desc = ContentDescriptor::new("gone.md");
        assert!(matches!(source.read_all(&desc), Err(SourceError::NotFound(_))));
    }
}
