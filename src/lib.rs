//! Light Compressor Library
//!
//! Runs one video compression job at a time: validates the request, drives
//! the job through `Idle -> Running -> Succeeded | Failed | Cancelled`,
//! streams monotonic progress to a single subscriber and honours
//! cooperative cancellation.

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config_initialization;
pub mod domain;
pub mod engine;
pub mod error;
pub mod output;
pub mod ports;
pub mod utils;

// Re-export commonly used types
pub use domain::errors::{CodecError, DomainError, ValidationError};
pub use domain::model::{CoordinatorState, JobDescriptor, JobId, MediaInfo, Outcome, VideoQuality};
pub use engine::{CompressionCoordinator, CompressionEvent, JobHandle, ProgressStream};
pub use error::{CompressorError, CompressorResult};
