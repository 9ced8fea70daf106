// Ports - Interface definitions (contracts)

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::*;
use crate::domain::model::*;

/// Receives progress from a running transcode
pub trait ProgressCallback: Send + Sync {
    /// Called at each work-unit boundary with a percentage in [0.0, 100.0]
    fn on_progress(&self, percent: f32);
}

/// An opened source, owned by the job that opened it
#[derive(Debug, Clone)]
pub struct MediaHandle {
    source: PathBuf,
    info: MediaInfo,
    interrupt: CancellationToken,
}

impl MediaHandle {
    pub fn new(source: PathBuf, info: MediaInfo) -> Self {
        Self {
            source,
            info,
            interrupt: CancellationToken::new(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    /// Ask the engine to stop at its next segment boundary
    pub fn interrupt(&self) {
        self.interrupt.cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    /// Resolves once `interrupt` has been called
    pub async fn interrupted(&self) {
        self.interrupt.cancelled().await
    }
}

/// Port for the codec/transcoding engine
#[async_trait]
pub trait CodecPort: Send + Sync {
    /// Short engine name for logs
    fn name(&self) -> &'static str;

    /// Open and probe a source
    async fn open(&self, source: &Path) -> Result<MediaHandle, CodecError>;

    /// Run the transcode described by `plan`, reporting progress as it goes.
    ///
    /// Must check for interruption at every work-unit boundary and return
    /// `CodecError::Interrupted` when asked to stop.
    async fn transcode(
        &self,
        handle: &MediaHandle,
        plan: &CompressionPlan,
        progress: &dyn ProgressCallback,
    ) -> Result<PathBuf, CodecError>;

    /// Request cooperative cancellation of a transcode using `handle`
    fn cancel(&self, handle: &MediaHandle) {
        handle.interrupt();
    }
}

/// Port for the authorization gate
///
/// Synchronous so that `start` stays non-blocking and deterministic.
pub trait AccessPort: Send + Sync {
    fn has_access(&self, resource: &Resource) -> bool;
}

/// Gate that grants everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPort for AllowAll {
    fn has_access(&self, _resource: &Resource) -> bool {
        true
    }
}
