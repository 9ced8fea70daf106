//! Error handling module for the compressor application layer

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::errors::DomainError;

/// Main error type for compressor operations outside the domain
#[derive(Error, Debug)]
pub enum CompressorError {
    /// Configuration file could not be read
    #[error("Failed to read config file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for the expected schema
    #[error("Invalid config file {}: {message}", path.display())]
    ConfigParse { path: PathBuf, message: String },

    /// A configuration value (from any layer) is out of range
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfig { key: String, message: String },

    /// Rejected or failed compression request
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for compressor operations
pub type CompressorResult<T> = std::result::Result<T, CompressorError>;
