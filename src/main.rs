//! Light Compressor CLI
//!
//! Compresses one video at a time, streaming progress and honouring Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! compressor compress --source clip.mp4 --destination small.mp4 --quality low
//! compressor probe --source clip.mp4 --json
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

use light_compressor::app::DefaultAppContainer;
use light_compressor::cli::{commands, Cli, Commands};
use light_compressor::config_initialization::initialize_configuration_hierarchy;
use light_compressor::utils::logging::LoggingSystem;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = initialize_configuration_hierarchy(&cli)?;
    let logging = LoggingSystem::new(config.logging());
    logging
        .initialize()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    logging.log_system_info();
    debug!(?config, "Effective configuration");

    let container = DefaultAppContainer::new(&config)?;

    let code = match cli.command {
        Commands::Compress(args) => {
            info!("Executing compress command");
            commands::compress(&container, args).await?
        }
        Commands::Probe(args) => {
            info!("Executing probe command");
            commands::probe(&container, args).await?
        }
    };

    std::process::exit(code);
}
