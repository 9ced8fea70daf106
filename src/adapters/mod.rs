// Adapters - External system implementations

pub mod exec_ffmpeg;
pub mod fs_access;
pub mod probe_ffprobe;
pub mod segment_copy;
pub mod toml_config;

// Re-export adapters
pub use exec_ffmpeg::FfmpegAdapter;
pub use fs_access::FsAccessAdapter;
pub use probe_ffprobe::FfprobeAdapter;
pub use segment_copy::SegmentCopyAdapter;
pub use toml_config::{CompressorConfig, EngineKind, TomlConfigAdapter};
