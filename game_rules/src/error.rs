//! Error types shared by the rules model and its builders.

use thiserror::Error;

/// A structurally invalid system configuration.
///
/// These are hard failures: a partially valid system is never handed to
/// consumers.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("system configuration is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("system field `{field}` is invalid: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("entity `{entity}` is invalid: {reason}")]
    InvalidEntity { entity: String, reason: String },

    #[error("block `{block}` of entity `{entity}` is not callable")]
    BlockNotCallable { entity: String, block: String },

    #[error("frontmatter field `{field}` of entity `{entity}` is invalid: {reason}")]
    InvalidFrontmatter {
        entity: String,
        field: String,
        reason: String,
    },

    #[error("expression `{expression}` of entity `{entity}` is invalid: {reason}")]
    InvalidExpression {
        entity: String,
        expression: String,
        reason: String,
    },
}

impl ConfigurationError {
    /// Shorthand for [`ConfigurationError::InvalidEntity`].
    pub fn invalid_entity(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigurationError::InvalidEntity {
            entity: entity.into(),
            reason: reason.into(),
        }
    }
}

/// Failure raised while invoking an authored callable.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("call to `{name}` failed: {message}")]
    Script { name: String, message: String },

    #[error("value conversion failed: {0}")]
    Conversion(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_field() {
        let err = ConfigurationError::MissingField("attributes");
        assert!(err.to_string().contains("`attributes`"));

        let err = ConfigurationError::BlockNotCallable {
            entity: "character".into(),
            block: "header".into(),
        };
        assert_eq!(
            err.to_string(),
            "block `header` of entity `character` is not callable"
        );
    }
}
