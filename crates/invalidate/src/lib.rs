//! Cache invalidation driven by directory watching
//!
//! This crate provides:
//! - `InvalidationSupervisor`: owns a watcher and drains its change queue
//! - Wait strategies for pacing the drain loop
//! - Refresh hook adapters

pub mod config;
pub mod hook;
pub mod supervisor;
pub mod wait;

// Re-exports
pub use config::{SupervisorConfig, WaitKind};
pub use supervisor::{DrainOutcome, InvalidationSupervisor, ShutdownHandle, SupervisorStats};
pub use wait::WaitStrategy;
pub use watcher::{ChangeKind, ChangeRecord, WatchError, WatcherControl, WatcherState};
