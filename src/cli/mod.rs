//! CLI module for the compressor
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::utils::logging::{LogFormat, LogLevel};

pub mod args;
pub mod commands;

/// Exit code for a successful compression
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for a rejected or failed compression
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for a cancelled compression (interrupted by Ctrl-C)
pub const EXIT_CANCELLED: i32 = 130;

/// Light Compressor
///
/// Compresses one video at a time with progress reporting and cooperative
/// cancellation.
#[derive(Parser, Debug)]
#[command(name = "compressor")]
#[command(about = "Light Compressor - quality-tiered video compression")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Logging level (overrides config and COMPRESSOR_LOG_LEVEL)
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Log output format: pretty, compact or json
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compress a video file
    Compress(args::CompressArgs),
    /// Show media information and the compression plan for a file
    Probe(args::ProbeArgs),
}
