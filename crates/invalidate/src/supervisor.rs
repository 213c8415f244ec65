//! Drain loop that turns queued changes into refresh requests
//!
//! The supervisor owns one [`DirectoryWatcher`] and runs it on its own thread.
//! Its own loop wakes on a timer, takes at most one change off the queue and
//! hands the path to the refresh hook.

use crate::config::SupervisorConfig;
use crate::wait::WaitStrategy;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};
use watcher::{ChangeConsumer, ChangeQueue, DirectoryWatcher, WatchError, WatcherControl};

/// Result of one drain attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The hook was called with this path
    Refreshed(PathBuf),
    /// Queue was empty
    Idle,
}

/// Counters collected by [`InvalidationSupervisor::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    pub iterations: u64,
    pub refreshed: u64,
    pub idle: u64,
}

/// Requests the drain loop to stop
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

/// Cache invalidation supervisor for a single directory tree
pub struct InvalidationSupervisor<H> {
    root: PathBuf,
    consumer: ChangeConsumer,
    watcher: WatcherControl,
    wait: WaitStrategy,
    hook: H,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<H> InvalidationSupervisor<H>
where
    H: FnMut(&Path) + Send + 'static,
{
    /// Watch `dir` and start the watcher thread
    ///
    /// Fails if the directory tree cannot be watched. The watcher thread is not
    /// monitored afterwards: if it stops, changes simply stop arriving.
    pub fn new(dir: impl AsRef<Path>, config: &SupervisorConfig, hook: H) -> watcher::Result<Self> {
        let (producer, consumer) = ChangeQueue::with_capacity(config.queue_capacity());
        let watcher = DirectoryWatcher::new(dir, producer)?;

        let root = watcher.root().to_path_buf();
        let control = watcher.control();
        watcher.spawn().map_err(|e| WatchError::io(&root, e))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            root,
            consumer,
            watcher: control,
            wait: config.wait(),
            hook,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    /// Canonical root of the managed tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enable/disable toggles of the owned watcher
    pub fn watcher(&self) -> &WatcherControl {
        &self.watcher
    }

    pub fn wait_strategy(&self) -> WaitStrategy {
        self.wait
    }

    /// Changes waiting to be drained
    pub fn pending(&self) -> usize {
        self.consumer.len()
    }

    /// Changes evicted from a bounded queue
    pub fn dropped(&self) -> u64 {
        self.consumer.dropped()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Take at most one change and hand its path to the hook
    pub fn drain_once(&mut self) -> DrainOutcome {
        match self.consumer.poll() {
            Some(record) => {
                info!("file [ {} ] needs refresh ({})", record.path.display(), record.kind);
                (self.hook)(&record.path);
                DrainOutcome::Refreshed(record.path)
            }
            None => {
                debug!("No work");
                DrainOutcome::Idle
            }
        }
    }

    /// Wait, drain, repeat until shutdown is requested
    ///
    /// The supervisor is consumed, so its watcher stops when this returns.
    pub async fn run(mut self) -> SupervisorStats {
        info!("Managing directory {}", self.root.display());

        let mut stats = SupervisorStats::default();
        let mut timer = self.wait.timer();
        let mut shutdown = self.shutdown_rx.clone();

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            debug!("Iteration wait -> {:?}", self.wait.period());
            tokio::select! {
                _ = timer.wait() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            stats.iterations += 1;
            match self.drain_once() {
                DrainOutcome::Refreshed(_) => stats.refreshed += 1,
                DrainOutcome::Idle => stats.idle += 1,
            }
        }

        info!(
            "Stopped managing {} ({} refreshed, {} idle)",
            self.root.display(),
            stats.refreshed,
            stats.idle
        );
        stats
    }
}

impl<H> Drop for InvalidationSupervisor<H> {
    fn drop(&mut self) {
        self.watcher.disable();
        self.watcher.interrupt();
    }
}
