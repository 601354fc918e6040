//! Tag and alias normalization for note frontmatter.

use serde_json::Value;

/// Normalize a `tags` value into `#`-prefixed tags.
///
/// Accepts an array or a string delimited by commas and/or whitespace.
pub fn normalize_tags(value: &Value) -> Vec<String> {
    let mut tags = Vec::new();
    for raw in scalar_entries(value, |c| c == ',' || c.is_whitespace()) {
        let tag = if raw.starts_with('#') {
            raw
        } else {
            format!("#{}", raw)
        };
        if tag.len() > 1 && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Normalize an `aliases` value into trimmed alias strings.
///
/// Accepts an array or a comma-delimited string.
pub fn normalize_aliases(value: &Value) -> Vec<String> {
    let mut aliases = Vec::new();
    for alias in scalar_entries(value, |c| c == ',') {
        if !aliases.contains(&alias) {
            aliases.push(alias);
        }
    }
    aliases
}

/// Check whether a frontmatter key holds tags.
pub fn is_tag_key(key: &str) -> bool {
    key.eq_ignore_ascii_case("tag") || key.eq_ignore_ascii_case("tags")
}

/// Check whether a frontmatter key holds aliases.
pub fn is_alias_key(key: &str) -> bool {
    key.eq_ignore_ascii_case("alias") || key.eq_ignore_ascii_case("aliases")
}

fn scalar_entries(value: &Value, delimiter: fn(char) -> bool) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::String(s) => s.split(delimiter).map(str::to_string).collect(),
        Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
        other => scalar_to_string(other).into_iter().collect(),
    };
    raw.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tags_from_string() {
        assert_eq!(
            normalize_tags(&json!("monster, #undead  boss")),
            vec!["#monster", "#undead", "#boss"]
        );
    }

    #[test]
    fn test_tags_from_array() {
        assert_eq!(
            normalize_tags(&json!(["monster", "#undead", "", 5, "monster"])),
            vec!["#monster", "#undead", "#5"]
        );
        assert!(normalize_tags(&json!(null)).is_empty());
    }

    #[test]
    fn test_aliases() {
        assert_eq!(
            normalize_aliases(&json!("Gob, Little Goblin ,")),
            vec!["Gob", "Little Goblin"]
        );
        assert_eq!(normalize_aliases(&json!([" Gob "])), vec!["Gob"]);
    }

    #[test]
    fn test_key_matching() {
        assert!(is_tag_key("Tags"));
        assert!(is_tag_key("TAG"));
        assert!(!is_tag_key("tagline"));
        assert!(is_alias_key("Aliases"));
    }
}
