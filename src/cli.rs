use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// actorcache - inspect dependency-graph computation caches
///
/// Lists the cache directories allocated to actor types and checks that
/// every committed entry is well formed.
#[derive(Parser, Debug)]
#[command(name = "actorcache")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect actor computation caches", long_about = None)]
pub struct Cli {
    /// Config file path (default: discovered actorcache.toml)
    #[arg(short = 'c', long, env = "ACTORCACHE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Cache root directory
    #[arg(long, env = "ACTORCACHE_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List cache directories allocated to an actor type
    Slots {
        /// Actor classpath (e.g. "text.Tokenizer")
        classpath: String,

        /// Print the slots as JSON, including the stored keys
        #[arg(long)]
        json: bool,
    },

    /// Check the structure of every cache entry under the cache root
    Verify,

    /// Configuration management utilities
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Validate {
        /// Path to config file
        path: PathBuf,
    },

    /// Print an example configuration file
    Example,

    /// Show the effective configuration
    Show,
}
