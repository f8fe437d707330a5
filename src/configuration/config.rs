use super::types::*;
use crate::data_capture::types::Feed;
use crate::error_handling::types::ConfigError;
use log::debug;
use serde::Deserialize;
use std::path::Path;

/// Application configuration structure that defines all runtime parameters.
///
/// The configuration is read from a TOML file. Every section and key is
/// optional; anything left out falls back to the values the capture tool is
/// normally run with.
///
/// # Examples
///
/// ```
/// use mouselounge::configuration::Config;
///
/// let config = Config::from_toml_str("[capture]\nprogram = \"/usr/local/bin/tcpflow\"\n").unwrap();
/// assert_eq!(config.capture.program, "/usr/local/bin/tcpflow");
/// assert_eq!(config.capture.mode_flags, vec!["-BC"]);
/// ```
///
/// # Fields Overview
///
/// - `capture`: executable and flags shared by both capture processes
/// - `filters`: one traffic filter expression per feed
#[derive(Debug, Default, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture tool invocation.
    pub capture: CaptureSettings,

    /// Traffic filter expressions.
    ///
    /// Each feed gets its own capture process, restricted by the filter
    /// configured here.
    pub filters: FeedFilters,
}

impl Config {
    /// Loads and validates the configuration stored at `path`.
    ///
    /// # Errors
    /// Returns [`ConfigError::IoError`] when the file cannot be read,
    /// [`ConfigError::TomlError`] when it is not valid TOML, and the
    /// validation errors of [`Config::validate`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that could never start a capture process.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.program.trim().is_empty() {
            return Err(ConfigError::EmptyProgram);
        }
        for feed in Feed::ALL {
            if self.filters.for_feed(feed).trim().is_empty() {
                return Err(ConfigError::EmptyFilter(feed.name().to_string()));
            }
        }
        Ok(())
    }
}
