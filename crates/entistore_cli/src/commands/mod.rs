//! CLI command implementations.

pub mod inspect;
pub mod uid;

use entistore_core::CoreError;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Error from the store engine.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Filesystem error.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path being read.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// JSON output failed.
    #[error("JSON output failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for CLI commands.
pub type CliResult<T> = Result<T, CliError>;
