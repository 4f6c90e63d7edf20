//! Error types for the ZipIntel CLI
//!
//! User-facing errors with actionable messages; pipeline errors from the
//! ingestion crates pass through with context on how to recover.

use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}. Check your config file and ZIPINTEL_* environment variables.")]
    Config(String),

    /// A durable state file is missing
    #[error("State file not found: '{0}'. Run 'zipintel batch' at least once to create it.")]
    StateNotFound(String),

    /// A durable state file exists but could not be parsed
    #[error("State file '{file}' is corrupt: {detail}. Remove the file to reset that state.")]
    StateCorrupt { file: String, detail: String },

    /// File system operation failed
    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error raised by the ingestion pipeline
    #[error(transparent)]
    Ingest(#[from] zipintel_common::IngestError),
}
