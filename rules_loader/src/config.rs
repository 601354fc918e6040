//! Loader configuration and compiler backend profiles.

use rhai::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Engine limits applied to every compile and evaluation.
///
/// A profile loaded from disk is the "portable" backend; without one the
/// built-in defaults are used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendProfile {
    /// Maximum operations per script run (0 = unlimited).
    pub max_operations: u64,

    pub max_call_levels: usize,

    pub max_expr_depth: usize,

    pub max_function_expr_depth: usize,

    /// Maximum string length in bytes (0 = unlimited).
    pub max_string_size: usize,

    pub max_array_size: usize,

    pub max_map_size: usize,

    /// Maximum number of modules a single run may import.
    pub max_modules: usize,

    /// Wall-clock budget per script run in milliseconds (0 = unlimited).
    pub timeout_ms: u64,
}

impl Default for BackendProfile {
    fn default() -> Self {
        Self {
            max_operations: 5_000_000,
            max_call_levels: 64,
            max_expr_depth: 64,
            max_function_expr_depth: 32,
            max_string_size: 1 << 20,
            max_array_size: 100_000,
            max_map_size: 100_000,
            max_modules: 256,
            timeout_ms: 5_000,
        }
    }
}

impl BackendProfile {
    /// Parse a profile from TOML.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read a profile from a TOML file.
    pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_toml_str(&text)
    }

    /// The wall-clock budget, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Apply the limits to an engine.
    pub(crate) fn apply(&self, engine: &mut Engine) {
        engine
            .set_max_operations(self.max_operations)
            .set_max_call_levels(self.max_call_levels)
            .set_max_expr_depths(self.max_expr_depth, self.max_function_expr_depth)
            .set_max_string_size(self.max_string_size)
            .set_max_array_size(self.max_array_size)
            .set_max_map_size(self.max_map_size)
            .set_max_modules(self.max_modules);
    }
}

/// Top-level loader settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Entry module file name inside a system folder.
    pub entry_file: String,

    /// Location of a portable backend profile.
    pub backend_profile: Option<PathBuf>,

    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            entry_file: "index.rhai".to_string(),
            backend_profile: None,
            log_filter: "info".to_string(),
        }
    }
}

impl LoaderConfig {
    /// Parse a config from TOML.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
