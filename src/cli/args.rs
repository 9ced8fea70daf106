//! Command-line argument definitions

use clap::Args;

use crate::adapters::toml_config::EngineKind;

/// Arguments for the compress command
#[derive(Args, Debug)]
pub struct CompressArgs {
    /// Source video path or file:// URI
    #[arg(short, long)]
    pub source: String,

    /// Destination path or file:// URI
    #[arg(short, long)]
    pub destination: String,

    /// Quality tier: very_low, low, medium, high or very_high
    #[arg(short, long, default_value = "medium")]
    pub quality: String,

    /// Output frame rate (default: keep the source rate)
    #[arg(long)]
    pub frame_rate: Option<u32>,

    /// Fail when the source bitrate is already at or below the minimum
    #[arg(long)]
    pub min_bitrate_check: bool,

    /// Codec engine: ffmpeg or copy
    #[arg(long)]
    pub engine: Option<EngineKind>,

    /// Emit progress and the outcome as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the probe command
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Source video path or file:// URI
    #[arg(short, long)]
    pub source: String,

    /// Quality tier used for the plan preview
    #[arg(short, long, default_value = "medium")]
    pub quality: String,

    /// Apply the minimum-bitrate check to the plan preview
    #[arg(long)]
    pub min_bitrate_check: bool,

    /// Codec engine used to open the source: ffmpeg or copy
    #[arg(long)]
    pub engine: Option<EngineKind>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
