//! Cachewatch CLI - cw command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;
mod logging;
mod settings;

/// Cachewatch - report stale cache entries as files change
#[derive(Parser)]
#[command(name = "cw")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a directory and report paths that need a refresh
    Watch(cmd::watch::WatchArgs),
    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show {
        /// Config file (default: ./cachewatch.toml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print as TOML
        #[arg(long)]
        raw: bool,
    },
    /// Print an example configuration file
    Example,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch(args) => cmd::watch::run(args).await,
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Show { config, raw } => cmd::config::run_show(config.as_deref(), raw),
            ConfigCommands::Example => cmd::config::run_example(),
        },
    }
}
