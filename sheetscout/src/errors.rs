/// Error types for sheetscout.
///
/// Errors fall into three groups that are surfaced at different points of a scan:
///
/// 1. **Configuration errors** (`ConfigError`, `InvalidPattern`, `Config`) are returned
///    synchronously while a request is validated. No file is opened when one of these
///    is raised.
/// 2. **File access errors** (`FileAccess`) are scoped to a single workbook. A search
///    task converts every reader failure into this variant at its own boundary, so a
///    corrupt file never takes down a worker or a sibling task.
/// 3. **Run errors** (`RunAborted`, `ThreadPool`) describe the run as a whole. Under the
///    fail-fast policy the coordinator turns the first `FileAccess` it observes into a
///    single `RunAborted` delivered to the event sink.
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Errors that can occur while configuring or running a scan
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Failed to read {}: {}", .path.display(), .message)]
    FileAccess { path: PathBuf, message: String },
    #[error("Scan aborted: failed to read {}: {}", .path.display(), .message)]
    RunAborted { path: PathBuf, message: String },
    #[error("Worker pool error: {0}")]
    ThreadPool(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Config file error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SearchError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_pattern(pattern: impl Into<String>) -> Self {
        Self::InvalidPattern(pattern.into())
    }

    pub fn file_access(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::FileAccess {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn run_aborted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::RunAborted {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors raised while validating a request
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_) | Self::InvalidPattern(_) | Self::Config(_)
        )
    }

    /// The workbook this error is about, if it is scoped to one
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::FileAccess { path, .. } | Self::RunAborted { path, .. } => Some(path),
            _ => None,
        }
    }
}
