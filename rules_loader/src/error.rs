//! Error types for each stage of the loading pipeline.
//!
//! Compile and evaluation failures are soft: they are logged and the load
//! yields `None`. Factory and configuration failures are hard and surface as
//! [`LoadError`].

use game_rules::ConfigurationError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failure reading from a content source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A compile-time problem, scoped to a module when one is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub path: Option<String>,
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    /// A diagnostic not tied to any module.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: None,
            line: None,
            message: message.into(),
        }
    }

    /// A diagnostic for the module at `path`.
    pub fn at(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            line: None,
            message: message.into(),
        }
    }

    /// Attach a line number.
    pub fn with_line(mut self, line: Option<usize>) -> Self {
        self.line = line;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.path, self.line) {
            (Some(path), Some(line)) => write!(f, "{}:{}: {}", path, line, self.message),
            (Some(path), None) => write!(f, "{}: {}", path, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// Compilation produced diagnostics instead of a bundle.
#[derive(Debug, Error)]
#[error("compilation failed with {} diagnostic(s)", .0.len())]
pub struct CompileError(pub Vec<Diagnostic>);

/// Failure running a compiled bundle.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("bundle raised an error: {0}")]
    Script(String),

    #[error("bundle did not bind `system`")]
    MissingExport,

    #[error("deferred `system` value failed: {0}")]
    Deferred(String),

    #[error("evaluation task failed: {0}")]
    Task(String),
}

/// An entity factory threw, or its deferred value failed.
#[derive(Debug, Error)]
#[error("failed to resolve entity `{key}`: {message}")]
pub struct FactoryResolutionError {
    pub key: String,
    pub message: String,
}

/// Hard failures of [`crate::RulesLoader::load_system`].
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Factory(#[from] FactoryResolutionError),

    #[error("system factory failed: {0}")]
    SystemFactory(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Failure reading loader configuration or a backend profile.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
