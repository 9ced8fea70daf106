//! Configuration initialization and hierarchy management

use tracing::{debug, info};

use crate::adapters::toml_config::{CompressorConfig, TomlConfigAdapter};
use crate::cli::{Cli, Commands};
use crate::error::CompressorResult;

/// Build the effective configuration: CLI > Env > File > Defaults
pub fn initialize_configuration_hierarchy(cli: &Cli) -> CompressorResult<CompressorConfig> {
    initialize_with_env(cli, |key| std::env::var(key).ok())
}

/// Same as [`initialize_configuration_hierarchy`] with an injectable environment
pub fn initialize_with_env<F>(cli: &Cli, lookup: F) -> CompressorResult<CompressorConfig>
where
    F: Fn(&str) -> Option<String>,
{
    // Step 1 + 2: defaults, then the config file if there is one
    let mut config = match TomlConfigAdapter::locate(cli.config.as_deref()) {
        Some(path) => TomlConfigAdapter::load(&path)?,
        None => {
            debug!("No config file found, using defaults");
            CompressorConfig::default()
        }
    };

    // Step 3: environment variables
    let env_overrides = TomlConfigAdapter::apply_env(&mut config, lookup)?;
    if env_overrides > 0 {
        info!("Applied {} environment variable overrides", env_overrides);
    }

    // Step 4: CLI arguments
    let cli_overrides = apply_cli_configuration_overrides(&mut config, cli);
    if cli_overrides > 0 {
        debug!("Applied {} CLI configuration overrides", cli_overrides);
    }

    config.validate()?;
    Ok(config)
}

fn apply_cli_configuration_overrides(config: &mut CompressorConfig, cli: &Cli) -> usize {
    let mut cli_overrides = 0;

    if let Some(level) = cli.log_level {
        config.log_level = level;
        cli_overrides += 1;
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
        cli_overrides += 1;
    }

    let engine = match &cli.command {
        Commands::Compress(args) => args.engine,
        Commands::Probe(args) => args.engine,
    };
    if let Some(engine) = engine {
        config.engine = engine;
        cli_overrides += 1;
    }

    cli_overrides
}
