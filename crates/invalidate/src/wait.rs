//! Wait strategies for the drain loop

use std::time::Duration;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Default pause between drain attempts
pub const DEFAULT_WAIT: Duration = Duration::from_millis(2000);

/// Shortest pause the timer will honor
const MIN_WAIT: Duration = Duration::from_millis(1);

/// How the supervisor paces its drain attempts
///
/// Both strategies are static. Neither adapts to queue depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    /// Sleep the full duration after every drain attempt
    Sleep(Duration),
    /// Drain on a fixed cadence; a late tick pushes later ticks back
    Interval(Duration),
}

impl Default for WaitStrategy {
    fn default() -> Self {
        WaitStrategy::Sleep(DEFAULT_WAIT)
    }
}

impl WaitStrategy {
    pub fn period(&self) -> Duration {
        match self {
            WaitStrategy::Sleep(d) | WaitStrategy::Interval(d) => *d,
        }
    }

    /// Build the timer; must be called from within a tokio runtime
    ///
    /// A zero period is raised to [`MIN_WAIT`].
    pub(crate) fn timer(&self) -> Timer {
        match *self {
            WaitStrategy::Sleep(d) => Timer::Sleep(d.max(MIN_WAIT)),
            WaitStrategy::Interval(period) => {
                let period = period.max(MIN_WAIT);
                let mut interval = time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Timer::Interval(interval)
            }
        }
    }
}

pub(crate) enum Timer {
    Sleep(Duration),
    Interval(Interval),
}

impl Timer {
    pub(crate) async fn wait(&mut self) {
        match self {
            Timer::Sleep(d) => time::sleep(*d).await,
            Timer::Interval(interval) => {
                interval.tick().await;
            }
        }
    }
}
