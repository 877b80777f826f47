/// Ponder CLI - ask questions of the tree-search reasoning engine
use clap::{Parser, Subcommand};
use ponder_core::{logging, ConfigManager, LoggingConfig};
use std::path::{Path, PathBuf};

mod commands;
mod generator;

use commands::{ask, config, init};

/// Load configuration and install logging, honouring `--log-level`
fn load_config(config_path: Option<&Path>, log_level: Option<String>) -> anyhow::Result<ConfigManager> {
    let mut manager = ConfigManager::load(config_path)?;
    if let Some(level) = log_level {
        manager.config_mut().logging.level = level;
    }
    logging::init(&manager.config().logging);
    Ok(manager)
}

#[derive(Parser)]
#[command(name = "ponder")]
#[command(about = "Tree-search reasoning over an async message bus", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (defaults to ./.ponder/config.toml, then ~/.ponder/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override log level
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question by searching over reasoning steps
    Ask {
        /// The question to answer
        query: String,

        /// Search iterations (overrides the config)
        #[arg(short, long)]
        iterations: Option<usize>,

        /// Print the response message content as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    Config,

    /// Write a default config file
    Init {
        /// Directory to create .ponder/ in (defaults to the current directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Ask {
            query,
            iterations,
            json,
        } => {
            let manager = load_config(args.config.as_deref(), args.log_level)?;
            ask::execute(manager.config(), &query, iterations, json).await?;
        }

        Commands::Config => {
            let manager = load_config(args.config.as_deref(), args.log_level)?;
            config::execute(&manager)?;
        }

        Commands::Init { dir, force } => {
            let mut logging_config = LoggingConfig::default();
            if let Some(level) = args.log_level {
                logging_config.level = level;
            }
            logging::init(&logging_config);
            init::execute(dir.as_deref(), force)?;
        }
    }

    Ok(())
}
