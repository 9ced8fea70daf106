//! Job orchestration: the coordinator and its progress channel

pub mod coordinator;
pub mod progress;

pub use coordinator::{CompressionCoordinator, JobHandle, JobSnapshot};
pub use progress::{CompressionEvent, JobReporter, ProgressChannel, ProgressStream};
