//! Supervisor configuration

use crate::wait::{WaitStrategy, DEFAULT_WAIT};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which [`WaitStrategy`] variant to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitKind {
    #[default]
    Sleep,
    Interval,
}

/// Drain loop and queue settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Pacing of drain attempts (default: sleep)
    #[serde(default)]
    pub wait_strategy: WaitKind,

    /// Wait between drain attempts in milliseconds (default: 2000)
    #[serde(default = "default_wait_interval_ms")]
    pub wait_interval_ms: u64,

    /// Change queue bound, 0 = unbounded (default: 0)
    #[serde(default)]
    pub queue_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            wait_strategy: WaitKind::default(),
            wait_interval_ms: default_wait_interval_ms(),
            queue_capacity: 0,
        }
    }
}

impl SupervisorConfig {
    pub fn wait(&self) -> WaitStrategy {
        let period = Duration::from_millis(self.wait_interval_ms);
        match self.wait_strategy {
            WaitKind::Sleep => WaitStrategy::Sleep(period),
            WaitKind::Interval => WaitStrategy::Interval(period),
        }
    }

    pub fn queue_capacity(&self) -> Option<usize> {
        (self.queue_capacity > 0).then_some(self.queue_capacity)
    }
}

fn default_wait_interval_ms() -> u64 {
    DEFAULT_WAIT.as_millis() as u64
}
