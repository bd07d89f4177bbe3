use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::cli::ConfigCommands;
use actorcache::config::ActorCacheConfig;

pub fn run(command: ConfigCommands, effective: &ActorCacheConfig) -> Result<()> {
    match command {
        ConfigCommands::Validate { path } => validate(&path),
        ConfigCommands::Example => example(),
        ConfigCommands::Show => show(effective),
    }
}

fn validate(path: &Path) -> Result<()> {
    info!("Validating config file: {}", path.display());

    let config = ActorCacheConfig::from_file(path)?;
    config.validate()?;

    println!("✓ Configuration file is valid: {}", path.display());
    println!("\nSummary:");
    println!("  - Cache directory: {}", config.cache_dir().display());
    println!("  - Lock timeout: {:?}", config.lock_timeout()?);
    println!(
        "  - Logging: {} ({})",
        config.logging.level, config.logging.format
    );

    Ok(())
}

fn example() -> Result<()> {
    println!("{}", ActorCacheConfig::example()?);
    Ok(())
}

fn show(config: &ActorCacheConfig) -> Result<()> {
    info!("Showing effective configuration");

    let mut resolved = config.clone();
    resolved.cache.dir = Some(config.cache_dir().display().to_string());

    println!("Effective Configuration:\n");
    println!("{}", toml::to_string_pretty(&resolved)?);

    Ok(())
}
