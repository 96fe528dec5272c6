//! Engine configuration, loadable from TOML.
//!
//! ```toml
//! uuid_test_size = 2
//! merge_delimiter = "|||"
//! output_format = "turtle"
//! default_language = "en"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigFileError;
use crate::graph::OutputFormat;

pub const DEFAULT_MERGE_DELIMITER: &str = "|||";

/// Configuration for one [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Width of deterministic alphabetic UUIDs. `None` uses random UUIDs.
    pub uuid_test_size: Option<usize>,
    /// Delimiter between repeated values handed to merging generators.
    pub merge_delimiter: String,
    /// Serialization used by the CLI when `--format` is not given.
    pub output_format: OutputFormat,
    /// Language for literals without an explicit or inherited language.
    pub default_language: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            uuid_test_size: None,
            merge_delimiter: DEFAULT_MERGE_DELIMITER.to_string(),
            output_format: OutputFormat::RdfXml,
            default_language: None,
        }
    }
}

impl EngineConfig {
    /// A configuration with reproducible UUIDs, for golden-output tests.
    pub fn deterministic(uuid_width: usize) -> Self {
        Self {
            uuid_test_size: Some(uuid_width),
            ..Default::default()
        }
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigFileError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigFileError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigFileError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigFileError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigFileError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}
