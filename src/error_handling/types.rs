use std::fmt;

use crate::data_capture::types::Feed;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    EmptyProgram,
    EmptyFilter(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::EmptyProgram => write!(f, "Capture program must not be empty"),
            ConfigError::EmptyFilter(feed) => {
                write!(f, "Traffic filter for the {} feed must not be empty", feed)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failures raised while running a capture subprocess.
#[derive(Debug)]
pub enum CaptureError {
    /// The capture tool could not be started at all.
    SpawnFailed { feed: Feed, source: std::io::Error },
    /// The subprocess was started but one of its pipes was not handed over.
    MissingPipe { feed: Feed, pipe: &'static str },
    /// The capture tool left unsuppressed text on stderr when its output ended.
    ToolFailed { feed: Feed, text: String },
}

impl CaptureError {
    pub fn feed(&self) -> Feed {
        match self {
            CaptureError::SpawnFailed { feed, .. }
            | CaptureError::MissingPipe { feed, .. }
            | CaptureError::ToolFailed { feed, .. } => *feed,
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::SpawnFailed { feed, source } => {
                write!(f, "Failed to spawn {} capture process: {}", feed, source)
            }
            CaptureError::MissingPipe { feed, pipe } => {
                write!(f, "{} capture process has no {} pipe", feed, pipe)
            }
            CaptureError::ToolFailed { text, .. } => write!(f, "{}", text.trim()),
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::SpawnFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum OrchestratorError {
    /// The dispatch registry has nothing registered, so there is nothing to listen for.
    NoHandlers,
    InvalidState(&'static str),
    Capture(CaptureError),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorError::NoHandlers => {
                write!(f, "Configuration error: no event handlers registered")
            }
            OrchestratorError::InvalidState(e) => write!(f, "Invalid orchestrator state: {}", e),
            OrchestratorError::Capture(e) => write!(f, "Capture error: {}", e),
        }
    }
}

impl std::error::Error for OrchestratorError {}

impl From<CaptureError> for OrchestratorError {
    fn from(err: CaptureError) -> Self {
        OrchestratorError::Capture(err)
    }
}
