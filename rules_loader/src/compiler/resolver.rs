//! Import resolution against the content vault.

use std::sync::Arc;

use crate::error::{Diagnostic, SourceError};
use crate::source::{normalize_path, ContentSource};

/// Extension every authored module carries.
pub const SOURCE_EXTENSION: &str = "rhai";

/// How a specifier was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    EntryPoint,
    Import,
}

/// Outcome of resolving one specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A vault path to load and bundle.
    Internal(String),
    /// Left for the sandbox's module shim.
    External,
}

/// Maps import specifiers onto vault reads.
///
/// Reads are not cached: every compile re-reads every module.
#[derive(Clone)]
pub struct VaultResolver {
    source: Arc<dyn ContentSource>,
}

impl VaultResolver {
    /// Create a resolver over `source`.
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self { source }
    }

    /// Resolve a specifier imported by `importer`.
    pub fn resolve(&self, specifier: &str, kind: ImportKind, importer: Option<&str>) -> Resolved {
        match kind {
            ImportKind::EntryPoint => Resolved::Internal(specifier.to_string()),
            ImportKind::Import if is_relative(specifier) => {
                Resolved::Internal(join_relative(importer.unwrap_or_default(), specifier))
            }
            ImportKind::Import => Resolved::External,
        }
    }

    /// Read a resolved module's source text.
    pub fn load(&self, path: &str) -> Result<String, Diagnostic> {
        let descriptor = self
            .source
            .describe(path)
            .ok_or_else(|| Diagnostic::at(path, "module not found"))?;
        self.source
            .read_all(&descriptor)
            .map_err(|e| match e {
                SourceError::NotFound(_) => Diagnostic::at(path, "module not found"),
                other => Diagnostic::at(path, other.to_string()),
            })
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

fn join_relative(importer: &str, specifier: &str) -> String {
    let directory = match importer.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    };
    let joined = normalize_path(&format!("{}/{}", directory, specifier));
    let extension = format!(".{}", SOURCE_EXTENSION);
    if joined.ends_with(&extension) {
        joined
    } else {
        joined + extension.as_str()
    }
}
