mod cli;
mod cli_utils;
mod commands;

use anyhow::Result;
use clap::Parser;

use actorcache::config_discovery::load_config_with_discovery;
use actorcache::logging::{self, LogFormat};
use actorcache::storage::CacheRepository;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config_with_discovery(cli.config.as_deref())?;
    if let Some(dir) = &cli.cache_dir {
        config.cache.dir = Some(dir.display().to_string());
    }

    // Initialize structured logging
    logging::init(
        &config.logging.level,
        LogFormat::parse(&config.logging.format),
    );

    match cli.command {
        Commands::Slots { classpath, json } => {
            let repo = CacheRepository::from_config(&config)?;
            commands::slots::run(&repo, &classpath, json)
        }
        Commands::Verify => commands::verify::run(&config.cache_dir()),
        Commands::Config(args) => commands::config::run(args.command, &config),
    }
}
