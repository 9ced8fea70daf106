use std::sync::Arc;

use tracing::debug;

use crate::adapters::{
    EngineKind, FfmpegAdapter, FfprobeAdapter, FsAccessAdapter, SegmentCopyAdapter,
};
use crate::adapters::toml_config::CompressorConfig;
use crate::app::{compress_interactor::CompressInteractor, probe_interactor::ProbeInteractor};
use crate::domain::errors::DomainError;
use crate::domain::rules::CompressionPlanner;
use crate::engine::coordinator::CompressionCoordinator;
use crate::ports::{AccessPort, CodecPort};

pub trait AppContainer: Send + Sync {
    fn compress_interactor(&self) -> Arc<CompressInteractor>;
    fn probe_interactor(&self) -> Arc<ProbeInteractor>;
}

pub struct DefaultAppContainer {
    compress_interactor: Arc<CompressInteractor>,
    probe_interactor: Arc<ProbeInteractor>,
}

impl DefaultAppContainer {
    /// Wire adapters from `config`. Must be called inside a tokio runtime.
    pub fn new(config: &CompressorConfig) -> Result<Self, DomainError> {
        let codec_port = Self::codec_port(config);
        let access_port: Arc<dyn AccessPort> =
            Arc::new(FsAccessAdapter::new().with_allowed_roots(&config.allowed_roots));
        let planner = CompressionPlanner::new(config.planner_settings());
        debug!(engine = codec_port.name(), "Building application container");

        let coordinator = Arc::new(CompressionCoordinator::new(
            Arc::clone(&codec_port),
            access_port,
            planner.clone(),
        )?);

        Ok(Self {
            compress_interactor: Arc::new(CompressInteractor::new(coordinator)),
            probe_interactor: Arc::new(ProbeInteractor::new(codec_port, planner)),
        })
    }

    fn codec_port(config: &CompressorConfig) -> Arc<dyn CodecPort> {
        match config.engine {
            EngineKind::Ffmpeg => Arc::new(
                FfmpegAdapter::new(
                    config.ffmpeg_path.clone(),
                    FfprobeAdapter::new(config.ffprobe_path.clone()),
                )
                .with_codecs(config.video_codec.clone(), config.audio_codec.clone())
                .with_stop_timeout(config.ffmpeg_stop_timeout()),
            ),
            EngineKind::Copy => Arc::new(SegmentCopyAdapter::new(config.segment_size)),
        }
    }
}

impl AppContainer for DefaultAppContainer {
    fn compress_interactor(&self) -> Arc<CompressInteractor> {
        Arc::clone(&self.compress_interactor)
    }

    fn probe_interactor(&self) -> Arc<ProbeInteractor> {
        Arc::clone(&self.probe_interactor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_container_selects_engine() {
        let config = CompressorConfig {
            engine: EngineKind::Copy,
            ..CompressorConfig::default()
        };
        let container = DefaultAppContainer::new(&config).unwrap();
        assert_eq!(container.compress_interactor().coordinator().codec_name(), "copy");

        let container = DefaultAppContainer::new(&CompressorConfig::default()).unwrap();
        assert_eq!(container.compress_interactor().coordinator().codec_name(), "ffmpeg");
    }

    #[test]
    fn test_container_needs_runtime() {
        let result = DefaultAppContainer::new(&CompressorConfig::default());
        assert!(matches!(result, Err(DomainError::NoRuntime)));
    }
}
