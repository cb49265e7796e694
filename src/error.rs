//! Error types for the packrun library.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for packrun operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while discovering and running packages.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred while reading the directory tree.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The persisted configuration file could not be parsed.
    #[error("Failed to parse {}: {source}", .path.display())]
    ConfigError {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// JSON encoding failed while saving the configuration.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A filesystem watch could not be established or torn down.
    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}
