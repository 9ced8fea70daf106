// Domain errors - Error types for the domain layer

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::model::CoordinatorState;

/// Rejections produced while validating a job descriptor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field was empty
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    /// The source could not be opened for reading
    #[error("unreadable source")]
    UnreadableSource { path: PathBuf },
    /// Source and destination resolve to the same file
    #[error("source and destination resolve to the same path: {}", .0.display())]
    SamePath(PathBuf),
    /// Frame rate override must be positive
    #[error("frame rate must be a positive integer, got {0}")]
    InvalidFrameRate(u32),
}

/// Failures reported by a codec engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Source could not be opened
    #[error("unreadable source")]
    UnreadableSource { path: PathBuf },
    /// Source was opened but could not be analyzed
    #[error("probe failed: {0}")]
    Probe(String),
    /// The transcoding step itself failed
    #[error("transcode failed: {0}")]
    Transcode(String),
    /// External tool missing or not executable
    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),
    /// Engine stopped at a segment boundary after a cancel request
    #[error("transcode interrupted")]
    Interrupted,
    /// I/O error while reading or writing media
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::Io(err.to_string())
    }
}

/// Domain-specific error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    /// Descriptor rejected before any job was created
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Authorization gate refused a resource
    #[error("access denied: {}", path.display())]
    AccessDenied { path: PathBuf },
    /// A job is already running and jobs are not queued
    #[error("a compression job is already running")]
    AlreadyRunning,
    /// Codec engine failure
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Source bitrate does not leave room for compression
    #[error("source bitrate {bitrate} bps is at or below the {minimum} bps compression threshold")]
    BitrateTooLow { bitrate: u64, minimum: u64 },
    /// State machine guard rejected a transition
    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: CoordinatorState,
        to: CoordinatorState,
    },
    /// No tokio runtime to run the worker on
    #[error("no async runtime available to run compression jobs")]
    NoRuntime,
}
