//! Build configuration via `viewbuild.toml`
//!
//! Every field has a default, so an empty file (or no file) gives the
//! standard settings. `from_file` validates eagerly.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BuildError, BuildResult};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "viewbuild.toml";

/// What to do when a map function fails on a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MapErrorPolicy {
    /// Abort the whole run
    #[default]
    FailFast,
    /// Skip the document for that view and record the failure
    Isolate,
}

/// Rebuild configuration.
///
/// # Example
///
/// ```toml
/// chunk_size_read = 200
/// chunk_size_write = 50
/// force_rebuild = false
/// on_map_error = "fail-fast"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Documents fetched per read
    #[serde(default = "default_chunk_size_read")]
    pub chunk_size_read: usize,
    /// Documents evaluated per bulk write
    #[serde(default = "default_chunk_size_write")]
    pub chunk_size_write: usize,
    /// Drop every stored view and rebuild from scratch
    #[serde(default)]
    pub force_rebuild: bool,
    /// Map failure policy
    #[serde(default)]
    pub on_map_error: MapErrorPolicy,
}

fn default_chunk_size_read() -> usize {
    200
}

fn default_chunk_size_write() -> usize {
    50
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            chunk_size_read: default_chunk_size_read(),
            chunk_size_write: default_chunk_size_write(),
            force_rebuild: false,
            on_map_error: MapErrorPolicy::default(),
        }
    }
}

impl BuildConfig {
    /// Default settings with `force_rebuild` set
    pub fn forced() -> Self {
        Self {
            force_rebuild: true,
            ..Self::default()
        }
    }

    /// Reject zero chunk sizes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the offending field.
    pub fn validate(&self) -> BuildResult<()> {
        if self.chunk_size_read == 0 {
            return Err(BuildError::InvalidConfig(
                "chunk_size_read must be greater than 0".to_string(),
            ));
        }
        if self.chunk_size_write == 0 {
            return Err(BuildError::InvalidConfig(
                "chunk_size_write must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# viewbuild configuration
#
# Source documents fetched per read (default: 200)
chunk_size_read = 200

# Documents evaluated per bulk write into each index store (default: 50)
chunk_size_write = 50

# Drop every stored view and its index store before rebuilding (default: false)
force_rebuild = false

# Map function failures: "fail-fast" aborts the run,
# "isolate" skips the document for that view and reports it
on_map_error = "fail-fast"
"#
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> BuildResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BuildError::InvalidConfig(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            BuildError::InvalidConfig(msg) => {
                BuildError::InvalidConfig(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse and validate config from TOML text
    pub fn from_toml(content: &str) -> BuildResult<Self> {
        let config: BuildConfig = toml::from_str(content)
            .map_err(|e| BuildError::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> BuildResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                BuildError::InvalidConfig(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> BuildResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BuildError::InvalidConfig(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            BuildError::InvalidConfig(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
