//! Error types for the command-line tool.

use std::path::PathBuf;
use thiserror::Error;
use varstore::{MediaError, StoreError};

/// Errors raised while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Store operation failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Image file could not be opened or created
    #[error("Failed to open image {path}: {source}")]
    Image {
        /// Path to the image file
        path: PathBuf,
        /// Underlying media error
        #[source]
        source: MediaError,
    },

    /// Invalid command input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Writing output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for command execution.
pub type Result<T> = std::result::Result<T, CliError>;
