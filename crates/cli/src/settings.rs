//! Configuration file loading and validation
//!
//! Every field has a default, so the file itself is optional. Lookup order:
//! `--config <FILE>`, then `cachewatch.toml` in the current directory.

use anyhow::{Context, Result};
use invalidate::SupervisorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up in the current directory
pub const DEFAULT_CONFIG_FILE: &str = "cachewatch.toml";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter when RUST_LOG is unset (default: info)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write logs to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Read and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Load `explicit` if given, else the default file if present, else defaults
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            let config = Self::load(&default_path)?;
            Ok((config, Some(default_path)))
        } else {
            Ok((Self::default(), None))
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        let interval = self.supervisor.wait_interval_ms;
        if !(10..=3_600_000).contains(&interval) {
            anyhow::bail!(
                "supervisor.wait_interval_ms must be between 10 and 3600000 (got {})",
                interval
            );
        }

        let capacity = self.supervisor.queue_capacity;
        if capacity > 10_000_000 {
            anyhow::bail!(
                "supervisor.queue_capacity must be at most 10000000 (got {})",
                capacity
            );
        }

        if !LOG_LEVELS.contains(&self.log.level.as_str()) {
            anyhow::bail!(
                "log.level must be one of {} (got {:?})",
                LOG_LEVELS.join(", "),
                self.log.level
            );
        }

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// Commented example configuration
pub fn example_config() -> &'static str {
    r#"# cachewatch configuration

[supervisor]
# How drain attempts are paced: "sleep" waits the full interval after each
# attempt, "interval" drains on a fixed cadence
wait_strategy = "sleep"

# Milliseconds between drain attempts (10-3600000)
wait_interval_ms = 2000

# Maximum queued changes before the oldest is dropped (0 = unbounded)
queue_capacity = 0

[log]
# trace, debug, info, warn or error; RUST_LOG takes precedence
level = "info"

# Log to a file instead of stderr
# file = "logs/cachewatch.log"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use invalidate::{WaitKind, WaitStrategy};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.supervisor.wait(), WaitStrategy::Sleep(Duration::from_millis(2000)));
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_example_parses_to_defaults() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_partial_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("cw.toml");
        fs::write(&path, "[supervisor]\nwait_strategy = \"interval\"\nwait_interval_ms = 500\n")?;

        let config = Config::load(&path)?;
        assert_eq!(config.supervisor.wait_strategy, WaitKind::Interval);
        assert_eq!(config.supervisor.wait_interval_ms, 500);
        assert_eq!(config.supervisor.queue_capacity, 0);
        assert_eq!(config.log, LogConfig::default());
        Ok(())
    }

    #[test]
    fn test_rejects_out_of_range_interval() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cw.toml");
        fs::write(&path, "[supervisor]\nwait_interval_ms = 1\n").unwrap();

        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let mut config = Config::default();
        config.log.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Config::discover(Some(&temp_dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_round_trip_through_toml() -> Result<()> {
        let mut config = Config::default();
        config.supervisor.queue_capacity = 128;
        config.log.file = Some(PathBuf::from("logs/cw.log"));

        let parsed: Config = toml::from_str(&config.to_toml()?)?;
        assert_eq!(parsed, config);
        Ok(())
    }
}
