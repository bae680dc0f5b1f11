//! Error types for the CLI

use thiserror::Error;

/// CLI-specific errors
///
/// Scenario failures are part of the printed trace; only setup problems
/// end up here.
#[derive(Debug, Error)]
pub enum CliError {
    /// The config file could not be read
    #[error("could not read config '{path}': {source}")]
    Io {
        /// Path given on the command line
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The config file is not valid loop configuration JSON
    #[error("invalid config '{path}': {source}")]
    Config {
        /// Path given on the command line
        path: String,
        /// Underlying parse error
        source: serde_json::Error,
    },
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
