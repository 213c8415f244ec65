//! Watch a directory and report stale paths

use crate::logging;
use crate::settings::Config;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use invalidate::{InvalidationSupervisor, WaitKind};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    /// Sleep the full interval after every drain attempt
    Sleep,
    /// Drain on a fixed cadence
    Interval,
}

impl From<StrategyArg> for WaitKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Sleep => WaitKind::Sleep,
            StrategyArg::Interval => WaitKind::Interval,
        }
    }
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Directory to watch
    pub dir: PathBuf,

    /// Config file (default: ./cachewatch.toml if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Milliseconds between drain attempts
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Drain pacing
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Change queue bound, 0 = unbounded
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Log level when RUST_LOG is unset
    #[arg(long)]
    pub log_level: Option<String>,

    /// Write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl WatchArgs {
    /// Layer command-line flags over the loaded config
    pub fn apply(&self, config: &mut Config) {
        if let Some(ms) = self.interval_ms {
            config.supervisor.wait_interval_ms = ms;
        }
        if let Some(strategy) = self.strategy {
            config.supervisor.wait_strategy = strategy.into();
        }
        if let Some(capacity) = self.capacity {
            config.supervisor.queue_capacity = capacity;
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        if let Some(file) = &self.log_file {
            config.log.file = Some(file.clone());
        }
    }
}

pub async fn run(args: WatchArgs) -> Result<()> {
    let (mut config, _) = Config::discover(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let _guard = logging::init(&config.log.level, config.log.file.as_deref())?;

    let supervisor = InvalidationSupervisor::new(&args.dir, &config.supervisor, |path: &Path| {
        println!("{} {}", "stale".yellow(), path.display());
    })
    .with_context(|| format!("Failed to watch {}", args.dir.display()))?;

    println!(
        "{} {} {}",
        "Watching".green(),
        supervisor.root().display(),
        format!("(drain every {:?})", supervisor.wait_strategy().period()).dimmed()
    );
    println!("{}", "Press Ctrl-C to stop".dimmed());

    let shutdown = supervisor.shutdown_handle();
    let task = tokio::spawn(supervisor.run());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Interrupt received, shutting down");
    shutdown.shutdown();

    let stats = task.await.context("Supervisor task failed")?;
    println!(
        "{} {} refreshed, {} idle",
        "Stopped:".bold(),
        stats.refreshed,
        stats.idle
    );
    Ok(())
}
