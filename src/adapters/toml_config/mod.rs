// TOML config adapter - Configuration loading from TOML files and the environment

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::adapters::exec_ffmpeg::DEFAULT_STOP_TIMEOUT;
use crate::adapters::segment_copy::DEFAULT_SEGMENT_SIZE;
use crate::domain::rules::{CompressionPlanner, PlannerSettings};
use crate::error::{CompressorError, CompressorResult};
use crate::utils::logging::{LogFormat, LogLevel, LoggingConfig};

/// Name of the config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "compressor.toml";

/// Codec engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Re-encode with the ffmpeg binary
    Ffmpeg,
    /// Segment-by-segment passthrough copy
    Copy,
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ffmpeg" => Ok(EngineKind::Ffmpeg),
            "copy" => Ok(EngineKind::Copy),
            other => Err(format!("unknown engine '{}' (expected ffmpeg or copy)", other)),
        }
    }
}

/// Effective configuration after all layers are applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorConfig {
    pub max_width: u32,
    pub max_height: u32,
    /// Bits per second; sources at or below it fail the min-bitrate check
    pub min_bitrate: u64,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Milliseconds ffmpeg gets to quit after a cancel before it is killed
    pub ffmpeg_stop_timeout_ms: u64,
    pub video_codec: String,
    pub audio_codec: String,
    pub engine: EngineKind,
    /// Bytes per work unit for the copy engine
    pub segment_size: usize,
    /// When non-empty, sources and destinations must live under one of these
    pub allowed_roots: Vec<PathBuf>,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            max_width: 720,
            max_height: 1280,
            min_bitrate: 2_000_000,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            ffmpeg_stop_timeout_ms: DEFAULT_STOP_TIMEOUT.as_millis() as u64,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            engine: EngineKind::Ffmpeg,
            segment_size: DEFAULT_SEGMENT_SIZE,
            allowed_roots: Vec::new(),
            log_level: LogLevel::Info,
            log_format: LogFormat::Compact,
        }
    }
}

impl CompressorConfig {
    pub fn planner_settings(&self) -> PlannerSettings {
        PlannerSettings {
            max_width: self.max_width,
            max_height: self.max_height,
            min_bit_rate: self.min_bitrate,
            threads: CompressionPlanner::optimal_thread_count(),
        }
    }

    pub fn ffmpeg_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.ffmpeg_stop_timeout_ms)
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level,
            format: self.log_format,
            ..LoggingConfig::default()
        }
    }

    pub fn validate(&self) -> CompressorResult<()> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(CompressorError::InvalidConfig {
                key: "max_width/max_height".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.segment_size == 0 {
            return Err(CompressorError::InvalidConfig {
                key: "segment_size".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    compressor: CompressorConfig,
}

/// TOML configuration adapter
pub struct TomlConfigAdapter;

impl TomlConfigAdapter {
    /// Parse the `[compressor]` table of a TOML document
    pub fn parse(content: &str, origin: &Path) -> CompressorResult<CompressorConfig> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| CompressorError::ConfigParse {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(file.compressor)
    }

    pub fn load(path: &Path) -> CompressorResult<CompressorConfig> {
        let content = std::fs::read_to_string(path).map_err(|source| CompressorError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content, path)?;
        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Config file to use: the explicit one, else the first default that exists
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        Self::default_paths().into_iter().find(|path| path.is_file())
    }

    /// `./compressor.toml`, then `$XDG_CONFIG_HOME/light-compressor/config.toml`
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        let config_home = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")));
        if let Some(config_home) = config_home {
            paths.push(config_home.join("light-compressor").join("config.toml"));
        }
        paths
    }

    /// Apply `COMPRESSOR_*` overrides read through `lookup`
    pub fn apply_env<F>(config: &mut CompressorConfig, lookup: F) -> CompressorResult<usize>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, value: &str) -> CompressorResult<T>
        where
            T::Err: std::fmt::Display,
        {
            value.trim().parse::<T>().map_err(|e| CompressorError::InvalidConfig {
                key: key.to_string(),
                message: e.to_string(),
            })
        }

        let mut applied = 0;
        let mut apply = |key: &str, config: &mut CompressorConfig| -> CompressorResult<()> {
            let Some(value) = lookup(key) else {
                return Ok(());
            };
            match key {
                "COMPRESSOR_MAX_WIDTH" => config.max_width = parsed(key, &value)?,
                "COMPRESSOR_MAX_HEIGHT" => config.max_height = parsed(key, &value)?,
                "COMPRESSOR_MIN_BITRATE" => config.min_bitrate = parsed(key, &value)?,
                "COMPRESSOR_FFMPEG_PATH" => config.ffmpeg_path = PathBuf::from(value),
                "COMPRESSOR_FFPROBE_PATH" => config.ffprobe_path = PathBuf::from(value),
                "COMPRESSOR_FFMPEG_STOP_TIMEOUT_MS" => {
                    config.ffmpeg_stop_timeout_ms = parsed(key, &value)?
                }
                "COMPRESSOR_VIDEO_CODEC" => config.video_codec = value,
                "COMPRESSOR_AUDIO_CODEC" => config.audio_codec = value,
                "COMPRESSOR_ENGINE" => config.engine = parsed(key, &value)?,
                "COMPRESSOR_SEGMENT_SIZE" => config.segment_size = parsed(key, &value)?,
                "COMPRESSOR_ALLOWED_ROOTS" => {
                    config.allowed_roots = std::env::split_paths(&value).collect()
                }
                "COMPRESSOR_LOG_LEVEL" => config.log_level = parsed(key, &value)?,
                "COMPRESSOR_LOG_FORMAT" => config.log_format = parsed(key, &value)?,
                _ => return Ok(()),
            }
            debug!(key, "Applied environment override");
            applied += 1;
            Ok(())
        };

        for key in ENV_KEYS {
            apply(key, config)?;
        }
        Ok(applied)
    }
}

const ENV_KEYS: [&str; 13] = [
    "COMPRESSOR_MAX_WIDTH",
    "COMPRESSOR_MAX_HEIGHT",
    "COMPRESSOR_MIN_BITRATE",
    "COMPRESSOR_FFMPEG_PATH",
    "COMPRESSOR_FFPROBE_PATH",
    "COMPRESSOR_FFMPEG_STOP_TIMEOUT_MS",
    "COMPRESSOR_VIDEO_CODEC",
    "COMPRESSOR_AUDIO_CODEC",
    "COMPRESSOR_ENGINE",
    "COMPRESSOR_SEGMENT_SIZE",
    "COMPRESSOR_ALLOWED_ROOTS",
    "COMPRESSOR_LOG_LEVEL",
    "COMPRESSOR_LOG_FORMAT",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_mobile_bounding_box() {
        let config = CompressorConfig::default();
        assert_eq!((config.max_width, config.max_height), (720, 1280));
        assert_eq!(config.min_bitrate, 2_000_000);
        assert_eq!(config.engine, EngineKind::Ffmpeg);
        assert_eq!(config.ffmpeg_stop_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_table_keeps_defaults() {
        let toml = r#"
            [compressor]
            max_width = 480
            engine = "copy"
            ffmpeg_stop_timeout_ms = 750
            allowed_roots = ["/srv/media"]
            log_format = "json"
        "#;
        let config = TomlConfigAdapter::parse(toml, Path::new("compressor.toml")).unwrap();
        assert_eq!(config.max_width, 480);
        assert_eq!(config.max_height, 1280);
        assert_eq!(config.engine, EngineKind::Copy);
        assert_eq!(config.ffmpeg_stop_timeout(), Duration::from_millis(750));
        assert_eq!(config.allowed_roots, vec![PathBuf::from("/srv/media")]);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_parse_empty_document() {
        let config = TomlConfigAdapter::parse("", Path::new("empty.toml")).unwrap();
        assert_eq!(config, CompressorConfig::default());
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        let result = TomlConfigAdapter::parse(
            "[compressor]\nmax_width = \"wide\"",
            Path::new("bad.toml"),
        );
        assert!(matches!(result, Err(CompressorError::ConfigParse { .. })));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = TomlConfigAdapter::parse(
            "[compressor]\nmin_bitrate = 1000\nengine = \"copy\"",
            Path::new("compressor.toml"),
        )
        .unwrap();

        let env: HashMap<&str, &str> = [
            ("COMPRESSOR_MIN_BITRATE", "5000000"),
            ("COMPRESSOR_VIDEO_CODEC", "libx265"),
            ("COMPRESSOR_FFMPEG_STOP_TIMEOUT_MS", "250"),
        ]
        .into_iter()
        .collect();
        let applied =
            TomlConfigAdapter::apply_env(&mut config, |key| env.get(key).map(|v| v.to_string()))
                .unwrap();

        assert_eq!(applied, 3);
        assert_eq!(config.ffmpeg_stop_timeout_ms, 250);
        assert_eq!(config.min_bitrate, 5_000_000);
        assert_eq!(config.video_codec, "libx265");
        assert_eq!(config.engine, EngineKind::Copy);
    }

    #[test]
    fn test_env_rejects_bad_numbers() {
        let mut config = CompressorConfig::default();
        let result = TomlConfigAdapter::apply_env(&mut config, |key| {
            (key == "COMPRESSOR_MAX_HEIGHT").then(|| "tall".to_string())
        });
        assert!(matches!(result, Err(CompressorError::InvalidConfig { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let result = TomlConfigAdapter::load(Path::new("/no/such/compressor.toml"));
        assert!(matches!(result, Err(CompressorError::ConfigRead { .. })));
    }

    #[test]
    fn test_locate_prefers_explicit_path() {
        let explicit = Path::new("/etc/custom.toml");
        assert_eq!(
            TomlConfigAdapter::locate(Some(explicit)),
            Some(explicit.to_path_buf())
        );
    }

    #[test]
    fn test_validate_rejects_zero_segment() {
        let config = CompressorConfig {
            segment_size: 0,
            ..CompressorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
