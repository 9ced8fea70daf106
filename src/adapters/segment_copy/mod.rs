//! Segment copy engine
//!
//! Passthrough [`CodecPort`] that copies the source to the destination in
//! fixed-size segments. Each segment is a work unit: progress is reported
//! and interruption checked at every boundary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::ports::*;

pub const DEFAULT_SEGMENT_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct SegmentCopyAdapter {
    segment_size: usize,
    segment_delay: Duration,
}

impl Default for SegmentCopyAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_SIZE)
    }
}

impl SegmentCopyAdapter {
    pub fn new(segment_size: usize) -> Self {
        Self {
            segment_size: segment_size.max(1),
            segment_delay: Duration::ZERO,
        }
    }

    /// Pause after every segment (throttling)
    pub fn with_segment_delay(mut self, delay: Duration) -> Self {
        self.segment_delay = delay;
        self
    }

    pub fn segment_size(&self) -> usize {
        self.segment_size
    }
}

#[async_trait]
impl CodecPort for SegmentCopyAdapter {
    fn name(&self) -> &'static str {
        "copy"
    }

    async fn open(&self, source: &Path) -> Result<MediaHandle, CodecError> {
        let unreadable = || CodecError::UnreadableSource {
            path: source.to_path_buf(),
        };
        let metadata = tokio::fs::metadata(source).await.map_err(|_| unreadable())?;
        if !metadata.is_file() {
            return Err(unreadable());
        }
        tokio::fs::File::open(source).await.map_err(|_| unreadable())?;

        let info = MediaInfo {
            path: source.to_path_buf(),
            container: source
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase()),
            file_size: metadata.len(),
            ..Default::default()
        };
        Ok(MediaHandle::new(source.to_path_buf(), info))
    }

    async fn transcode(
        &self,
        handle: &MediaHandle,
        plan: &CompressionPlan,
        progress: &dyn ProgressCallback,
    ) -> Result<PathBuf, CodecError> {
        let mut input = tokio::fs::File::open(handle.source()).await?;
        let total = input.metadata().await?.len();

        let directory = plan
            .destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let staging = tempfile::Builder::new()
            .prefix(".compressing-")
            .tempfile_in(directory)?;
        let mut output = tokio::fs::File::from_std(staging.reopen()?);

        let mut buffer = vec![0u8; self.segment_size];
        let mut copied: u64 = 0;
        let mut segments = 0usize;
        progress.on_progress(0.0);

        loop {
            if handle.is_interrupted() {
                debug!(segments, copied, "Copy interrupted at segment boundary");
                return Err(CodecError::Interrupted);
            }

            let read = input.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            output.write_all(&buffer[..read]).await?;
            copied += read as u64;
            segments += 1;

            if total > 0 {
                progress.on_progress((copied as f64 / total as f64 * 100.0) as f32);
            }
            if !self.segment_delay.is_zero() {
                tokio::time::sleep(self.segment_delay).await;
            }
        }

        output.flush().await?;
        output.sync_all().await?;
        drop(output);
        if handle.is_interrupted() {
            return Err(CodecError::Interrupted);
        }

        staging
            .persist(&plan.destination)
            .map_err(|e| CodecError::Io(e.error.to_string()))?;
        debug!(segments, bytes = copied, "Copy finished");
        progress.on_progress(100.0);
        Ok(plan.destination.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<f32>>);

    impl ProgressCallback for Recorder {
        fn on_progress(&self, percent: f32) {
            self.0.lock().unwrap().push(percent);
        }
    }

    fn plan_for(source: &Path, destination: &Path) -> CompressionPlan {
        CompressionPlan {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            quality: VideoQuality::Medium,
            rate_control: RateControl::Crf(27),
            dimensions: None,
            frame_rate: None,
            threads: 1,
        }
    }

    #[tokio::test]
    async fn test_copy_reports_each_segment() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.mp4");
        let destination = dir.path().join("b.mp4");
        std::fs::write(&source, vec![7u8; 4000]).unwrap();

        let engine = SegmentCopyAdapter::new(1000);
        let handle = engine.open(&source).await.unwrap();
        assert_eq!(handle.info().file_size, 4000);
        assert_eq!(handle.info().container.as_deref(), Some("mp4"));

        let recorder = Recorder::default();
        let written = engine
            .transcode(&handle, &plan_for(&source, &destination), &recorder)
            .await
            .unwrap();

        assert_eq!(written, destination);
        assert_eq!(std::fs::read(&destination).unwrap(), vec![7u8; 4000]);
        let ticks = recorder.0.lock().unwrap().clone();
        assert_eq!(ticks.first(), Some(&0.0));
        assert_eq!(ticks.last(), Some(&100.0));
        assert!(ticks.len() >= 5);
        assert!(ticks.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_open_missing_source_is_unreadable() {
        let engine = SegmentCopyAdapter::default();
        let result = engine.open(Path::new("/no/such/dir/missing.mp4")).await;
        assert!(matches!(result, Err(CodecError::UnreadableSource { .. })));
    }

    #[tokio::test]
    async fn test_open_directory_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let result = SegmentCopyAdapter::default().open(dir.path()).await;
        assert!(matches!(result, Err(CodecError::UnreadableSource { .. })));
    }

    #[tokio::test]
    async fn test_interrupt_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.mp4");
        let destination = dir.path().join("b.mp4");
        std::fs::write(&source, vec![1u8; 10_000]).unwrap();

        let engine = SegmentCopyAdapter::new(100);
        let handle = engine.open(&source).await.unwrap();
        engine.cancel(&handle);

        let result = engine
            .transcode(&handle, &plan_for(&source, &destination), &Recorder::default())
            .await;
        assert_eq!(result, Err(CodecError::Interrupted));
        assert!(!destination.exists());
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_empty_source_completes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("empty.mp4");
        let destination = dir.path().join("out.mp4");
        std::fs::write(&source, b"").unwrap();

        let engine = SegmentCopyAdapter::new(64);
        let handle = engine.open(&source).await.unwrap();
        let recorder = Recorder::default();
        engine
            .transcode(&handle, &plan_for(&source, &destination), &recorder)
            .await
            .unwrap();

        assert!(destination.exists());
        assert_eq!(recorder.0.lock().unwrap().last(), Some(&100.0));
    }
}
