//! Front-matter parsing for vault notes.
//!
//! A note may open with a metadata block:
//!
//! ```text
//! ---
//! hp: 7
//! tags: monster, goblinoid
//! ---
//! Free-form content.
//! ```

mod tags;

pub use tags::*;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::source::ContentDescriptor;

/// A note with its metadata extracted and cleaned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedDocument {
    /// Remaining metadata. Serialized first so computed fields take precedence.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,

    pub path: String,
    pub name: String,
    pub content: String,
    pub tags: Vec<String>,
    pub aliases: Vec<String>,
}

impl ParsedDocument {
    /// Parse a note read from `descriptor`.
    pub fn parse(descriptor: &ContentDescriptor, text: &str) -> Self {
        let (block, body) = split_frontmatter(text);
        let mut metadata = match block {
            Some(yaml) => parse_metadata(&descriptor.path, yaml),
            None => Map::new(),
        };

        let mut tags = Vec::new();
        let mut aliases = Vec::new();
        let keys: Vec<String> = metadata.keys().cloned().collect();
        for key in keys {
            if is_tag_key(&key) {
                if let Some(value) = metadata.remove(&key) {
                    for tag in normalize_tags(&value) {
                        if !tags.contains(&tag) {
                            tags.push(tag);
                        }
                    }
                }
            } else if is_alias_key(&key) {
                if let Some(value) = metadata.remove(&key) {
                    aliases.extend(normalize_aliases(&value));
                }
            }
        }
        metadata.retain(|_, value| !is_empty_value(value));

        Self {
            metadata,
            path: descriptor.path.clone(),
            name: descriptor.name.clone(),
            content: body.to_string(),
            tags,
            aliases,
        }
    }
}

/// Split a note into its metadata block (if any) and body.
pub fn split_frontmatter(text: &str) -> (Option<&str>, &str) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let Some(rest) = strip_delimiter_line(text) else {
        return (None, text);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let block = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(block), body);
        }
        offset += line.len();
    }
    (None, text)
}

fn strip_delimiter_line(text: &str) -> Option<&str> {
    let (first, rest) = match text.find('\n') {
        Some(idx) => (&text[..idx], &text[idx + 1..]),
        None => (text, ""),
    };
    (first.trim_end() == "---").then_some(rest)
}

fn parse_metadata(path: &str, yaml: &str) -> Map<String, Value> {
    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Object(map)) => map,
        Ok(Value::Null) => Map::new(),
        Ok(_) => {
            warn!(path, "frontmatter is not a mapping, ignoring it");
            Map::new()
        }
        Err(e) => {
            warn!(path, error = %e, "invalid frontmatter, ignoring it");
            Map::new()
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
