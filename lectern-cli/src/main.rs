use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use lectern_config::{ConfigLoader, LecternConfig};
use lectern_logging::{init_logging_from_config, init_simple_tracing, init_worker_tracing};

mod cli;
mod commands;

use cli::{Cli, Commands, ConfigCommands};

/// Load configuration from file or environment
fn load_config(config_path: Option<&PathBuf>) -> Result<LecternConfig> {
    let loader = ConfigLoader::new();

    let config = match config_path {
        Some(path) if path.exists() => {
            info!("Loading configuration from: {:?}", path);
            loader.from_file(path)?
        }
        Some(path) => {
            warn!("Configuration file not found: {:?}, using environment and defaults", path);
            loader.from_env()?
        }
        None => {
            info!("No configuration file specified, using environment and defaults");
            loader.from_env()?
        }
    };

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Worker mode runs before anything touches stdout; that pipe is the IPC channel.
    if cli.worker {
        init_worker_tracing(cli.log_level.as_deref())?;
        return commands::worker::run_worker_process().await;
    }

    match cli.command {
        Some(Commands::Config { config_cmd }) => {
            init_simple_tracing(cli.log_level.as_deref().unwrap_or("warn"))?;
            match config_cmd {
                ConfigCommands::Validate { config_file } => {
                    commands::config::handle_config_validate(&config_file)
                }
                ConfigCommands::Sample { output, force } => {
                    commands::config::handle_config_sample(output.as_deref(), force)
                }
            }
        }
        command => {
            let mut config = load_config(cli.config.as_ref())?;
            if let Some(Commands::Serve { bind, port }) = command {
                if let Some(bind) = bind {
                    config.server.bind_address = bind;
                }
                if let Some(port) = port {
                    config.server.port = port;
                }
            }

            init_logging_from_config(&config.logging, cli.log_level.as_deref())?;
            info!("Starting Lectern {}", env!("CARGO_PKG_VERSION"));

            commands::serve::serve(config).await
        }
    }
}
