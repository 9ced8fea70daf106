//! FFprobe adapter for media file probing
//!
//! Runs `ffprobe -print_format json -show_format -show_streams` and maps the
//! output onto [`MediaInfo`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::domain::errors::*;
use crate::domain::model::*;

#[derive(Debug, Default, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<serde_json::Value>,
}

impl FfprobeStream {
    fn rotation(&self) -> Option<i32> {
        let from_side_data = self
            .side_data_list
            .iter()
            .find_map(|data| data.get("rotation").and_then(|r| r.as_f64()));
        from_side_data
            .map(|r| r.round() as i32)
            .or_else(|| self.tags.get("rotate").and_then(|r| r.trim().parse().ok()))
    }

    fn frame_rate(&self) -> Option<f64> {
        [&self.avg_frame_rate, &self.r_frame_rate]
            .into_iter()
            .flatten()
            .find_map(|rate| parse_rational(rate))
    }
}

/// Parse an ffprobe rational such as `30000/1001`; `0/0` yields `None`
fn parse_rational(value: &str) -> Option<f64> {
    let (num, den) = match value.split_once('/') {
        Some((num, den)) => (num.trim().parse::<f64>().ok()?, den.trim().parse::<f64>().ok()?),
        None => (value.trim().parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

/// FFprobe-based probe adapter
#[derive(Debug, Clone)]
pub struct FfprobeAdapter {
    ffprobe: PathBuf,
}

impl Default for FfprobeAdapter {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl FfprobeAdapter {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }

    /// Probe `path`. A missing or unreadable file yields `UnreadableSource`.
    pub async fn probe(&self, path: &Path) -> Result<MediaInfo, CodecError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| CodecError::UnreadableSource {
                path: path.to_path_buf(),
            })?;
        if !metadata.is_file() {
            return Err(CodecError::UnreadableSource {
                path: path.to_path_buf(),
            });
        }

        debug!(path = %path.display(), "Probing media with ffprobe");
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    CodecError::ToolUnavailable(self.ffprobe.display().to_string())
                }
                _ => CodecError::Io(e.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CodecError::Probe(
                stderr.lines().last().unwrap_or("ffprobe failed").trim().to_string(),
            ));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        Self::parse_output(path, &json, metadata.len())
    }

    /// Map ffprobe JSON onto [`MediaInfo`]
    pub fn parse_output(path: &Path, json: &str, file_size: u64) -> Result<MediaInfo, CodecError> {
        let parsed: FfprobeOutput =
            serde_json::from_str(json).map_err(|e| CodecError::Probe(e.to_string()))?;
        let format = parsed.format.unwrap_or_default();

        let video = parsed
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));
        let has_audio = parsed
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio"));
        if video.is_none() && !has_audio {
            return Err(CodecError::Probe("no audio or video streams".to_string()));
        }

        let duration = format
            .duration
            .as_deref()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(Duration::from_secs_f64);
        let size = format
            .size
            .as_deref()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(file_size);

        Ok(MediaInfo {
            path: path.to_path_buf(),
            container: format.format_name,
            duration,
            bit_rate: format.bit_rate.as_deref().and_then(|b| b.trim().parse().ok()),
            file_size: size,
            width: video.and_then(|v| v.width),
            height: video.and_then(|v| v.height),
            frame_rate: video.and_then(|v| v.frame_rate()),
            rotation: video.and_then(|v| v.rotation()),
            has_audio,
        })
    }
}
