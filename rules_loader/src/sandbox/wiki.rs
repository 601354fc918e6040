//! The `wiki` fixture: read-only note lookup for authored scripts.

use rhai::{Dynamic, Engine, EvalAltResult, Map};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::frontmatter::ParsedDocument;
use crate::source::{normalize_path, ContentDescriptor, ContentSource};

/// Resolves notes by name or folder on behalf of a script.
#[derive(Clone)]
pub struct Wiki {
    source: Arc<dyn ContentSource>,
}

impl Wiki {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self { source }
    }

    /// Find a note by path or name.
    ///
    /// Tries the exact path, then the path with `.md` appended, then the first
    /// markdown note (in path order) whose file stem equals `name`.
    pub fn file(&self, name: &str) -> Option<ParsedDocument> {
        let path = normalize_path(name);
        let descriptor = self
            .source
            .describe(&path)
            .or_else(|| self.source.describe(&format!("{}.md", path)))
            .or_else(|| {
                let stem = ContentDescriptor::new(&path).name;
                self.source
                    .list_all()
                    .into_iter()
                    .find(|d| d.is_markdown() && d.name == stem)
            })?;
        self.read(&descriptor)
    }

    /// Every markdown note under `path`, recursively, sorted by path.
    pub fn folder(&self, path: &str) -> Vec<ParsedDocument> {
        let prefix = normalize_path(path);
        let mut descriptors: Vec<ContentDescriptor> = self
            .source
            .list_all()
            .into_iter()
            .filter(|d| d.is_markdown() && in_folder(&d.path, &prefix))
            .collect();
        descriptors.sort();
        descriptors.iter().filter_map(|d| self.read(d)).collect()
    }

    /// The `#{wiki}` context handed to factories.
    pub fn context(&self) -> Map {
        let mut ctx = Map::new();
        ctx.insert("wiki".into(), Dynamic::from(self.clone()));
        ctx
    }

    fn read(&self, descriptor: &ContentDescriptor) -> Option<ParsedDocument> {
        match self.source.read_all(descriptor) {
            Ok(text) => Some(ParsedDocument::parse(descriptor, &text)),
            Err(e) => {
                warn!(path = %descriptor.path, error = %e, "wiki read failed");
                None
            }
        }
    }

    /// Expose `file` and `folder` as methods on the `Wiki` type.
    pub(crate) fn register(engine: &mut Engine) {
        engine
            .register_type_with_name::<Wiki>("Wiki")
            .register_fn(
                "file",
                |wiki: Wiki, name: &str| -> Result<Dynamic, Box<EvalAltResult>> {
                    match wiki.file(name) {
                        Some(document) => rhai::serde::to_dynamic(document),
                        None => Ok(Dynamic::UNIT),
                    }
                },
            )
            .register_fn(
                "folder",
                |wiki: Wiki, path: &str| -> Result<Dynamic, Box<EvalAltResult>> {
                    rhai::serde::to_dynamic(wiki.folder(path))
                },
            );
    }
}

impl fmt::Debug for Wiki {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Wiki")
    }
}

fn in_folder(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}
