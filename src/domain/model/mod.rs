// Domain models - Core types and data structures

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Named compression preset trading output size against fidelity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoQuality {
    VeryLow,
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl VideoQuality {
    /// Resolve a quality name. Unknown names fall back to `Medium`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "very_low" => VideoQuality::VeryLow,
            "low" => VideoQuality::Low,
            "medium" => VideoQuality::Medium,
            "high" => VideoQuality::High,
            "very_high" => VideoQuality::VeryHigh,
            _ => VideoQuality::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoQuality::VeryLow => "very_low",
            VideoQuality::Low => "low",
            VideoQuality::Medium => "medium",
            VideoQuality::High => "high",
            VideoQuality::VeryHigh => "very_high",
        }
    }

    /// Fraction of the source bitrate kept in the output
    pub fn bitrate_factor(&self) -> f64 {
        match self {
            VideoQuality::VeryLow => 0.1,
            VideoQuality::Low => 0.2,
            VideoQuality::Medium => 0.3,
            VideoQuality::High => 0.4,
            VideoQuality::VeryHigh => 0.6,
        }
    }

    /// Constant rate factor used when the source bitrate is unknown
    pub fn fallback_crf(&self) -> u8 {
        match self {
            VideoQuality::VeryLow => 34,
            VideoQuality::Low => 30,
            VideoQuality::Medium => 27,
            VideoQuality::High => 24,
            VideoQuality::VeryHigh => 21,
        }
    }
}

impl fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One compression request, as submitted by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Path or `file://` URI of the media to compress
    pub source: String,
    /// Path or `file://` URI to write the compressed media to
    pub destination: String,
    /// Quality tier name; unknown names resolve to `medium`
    pub quality: String,
    /// Output frame rate; `None` keeps the source rate
    pub frame_rate: Option<u32>,
    /// Fail instead of compressing sources that are already at a low bitrate
    pub min_bitrate_check_enabled: bool,
}

impl JobDescriptor {
    /// Create a descriptor with medium quality and no overrides
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            quality: VideoQuality::Medium.as_str().to_string(),
            frame_rate: None,
            min_bitrate_check_enabled: false,
        }
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    pub fn with_min_bitrate_check(mut self, enabled: bool) -> Self {
        self.min_bitrate_check_enabled = enabled;
        self
    }
}

/// A descriptor that passed validation, with resolved paths
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedDescriptor {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Destination as the caller wrote it, reported back on success
    pub requested_destination: PathBuf,
    pub quality: VideoQuality,
    pub frame_rate: Option<u32>,
    pub min_bitrate_check_enabled: bool,
}

/// Identifier of one accepted compression job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Lifecycle state of the coordinator and its active job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl CoordinatorState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CoordinatorState::Succeeded | CoordinatorState::Failed | CoordinatorState::Cancelled
        )
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: CoordinatorState) -> bool {
        use CoordinatorState::*;
        match (self, next) {
            (Idle, Running) => true,
            (Running, Running) => true,
            (Running, Succeeded) | (Running, Failed) | (Running, Cancelled) => true,
            (Succeeded, Idle) | (Failed, Idle) | (Cancelled, Idle) => true,
            _ => false,
        }
    }
}

/// Terminal result of a job; exactly one is delivered per accepted start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { output_path: PathBuf },
    Failure { reason: String },
    Cancelled,
}

impl Outcome {
    pub fn state(&self) -> CoordinatorState {
        match self {
            Outcome::Success { .. } => CoordinatorState::Succeeded,
            Outcome::Failure { .. } => CoordinatorState::Failed,
            Outcome::Cancelled => CoordinatorState::Cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// Single-key response body: `onSuccess`, `onFailure` or `onCancelled`
    pub fn response_body(&self) -> serde_json::Value {
        match self {
            Outcome::Success { output_path } => {
                serde_json::json!({ "onSuccess": output_path.to_string_lossy() })
            }
            Outcome::Failure { reason } => serde_json::json!({ "onFailure": reason }),
            Outcome::Cancelled => serde_json::json!({ "onCancelled": true }),
        }
    }
}

/// Progress of one job, as a percentage in [0.0, 100.0]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job: JobId,
    pub percent: f32,
}

/// Facts probed from a source media file. Any field may be unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub container: Option<String>,
    pub duration: Option<Duration>,
    /// Container bitrate in bits per second
    pub bit_rate: Option<u64>,
    pub file_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub rotation: Option<i32>,
    pub has_audio: bool,
}

impl MediaInfo {
    /// Container bitrate, or one derived from size and duration
    pub fn effective_bit_rate(&self) -> Option<u64> {
        if let Some(bit_rate) = self.bit_rate.filter(|b| *b > 0) {
            return Some(bit_rate);
        }
        let seconds = self.duration?.as_secs_f64();
        if seconds <= 0.0 || self.file_size == 0 {
            return None;
        }
        Some((self.file_size as f64 * 8.0 / seconds) as u64)
    }

    /// Display dimensions after applying a 90/270 degree rotation
    pub fn display_dimensions(&self) -> Option<(u32, u32)> {
        let (width, height) = (self.width?, self.height?);
        match self.rotation.map(|r| r.rem_euclid(360)) {
            Some(90) | Some(270) => Some((height, width)),
            _ => Some((width, height)),
        }
    }
}

/// How a target bitrate is expressed to the encoder
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateControl {
    /// Average bitrate in bits per second
    Bitrate(u64),
    /// Constant rate factor
    Crf(u8),
}

/// Encoder settings derived from a validated descriptor and probed media
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionPlan {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub quality: VideoQuality,
    pub rate_control: RateControl,
    /// Target dimensions; `None` keeps the source size
    pub dimensions: Option<(u32, u32)>,
    /// Target frame rate; `None` keeps the source rate
    pub frame_rate: Option<u32>,
    pub threads: usize,
}

/// A resource guarded by the access gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Read(PathBuf),
    Write(PathBuf),
}

impl Resource {
    pub fn path(&self) -> &PathBuf {
        match self {
            Resource::Read(path) | Resource::Write(path) => path,
        }
    }
}
