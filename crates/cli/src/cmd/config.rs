//! Configuration inspection command

use crate::settings::{self, Config};
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

/// Print the effective configuration
pub fn run_show(explicit: Option<&Path>, raw: bool) -> Result<()> {
    let (config, source) = Config::discover(explicit)?;

    if raw {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    match source {
        Some(path) => println!("{}: {}\n", "Location".dimmed(), path.display().dimmed()),
        None => println!("{}\n", "No config file found, showing defaults".dimmed()),
    }

    println!("{}", "[supervisor]".yellow());
    println!(
        "  {} = {:?}",
        "wait_strategy".cyan(),
        config.supervisor.wait_strategy
    );
    println!(
        "  {} = {} {}",
        "wait_interval_ms".cyan(),
        config.supervisor.wait_interval_ms,
        format!("({:?})", config.supervisor.wait().period()).dimmed()
    );
    println!(
        "  {} = {} {}",
        "queue_capacity".cyan(),
        config.supervisor.queue_capacity,
        if config.supervisor.queue_capacity == 0 {
            "(unbounded)".dimmed().to_string()
        } else {
            "(drop oldest when full)".dimmed().to_string()
        }
    );

    println!("\n{}", "[log]".yellow());
    println!("  {} = {}", "level".cyan(), config.log.level);
    match &config.log.file {
        Some(file) => println!("  {} = {}", "file".cyan(), file.display()),
        None => println!("  {} = {}", "file".cyan(), "(stderr)".dimmed()),
    }

    println!("\n{}", "Valid Ranges:".bold());
    println!("  wait_interval_ms: 10-3,600,000");
    println!("  queue_capacity: 0-10,000,000 (0 = unbounded)");

    Ok(())
}

/// Print a commented example configuration
pub fn run_example() -> Result<()> {
    print!("{}", settings::example_config());
    Ok(())
}
