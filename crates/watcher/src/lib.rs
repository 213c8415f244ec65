//! Recursive directory watching for cache invalidation
//!
//! This crate provides:
//! - A per-directory watch registry keyed by directory identity
//! - A directory watcher that extends its coverage as the tree grows
//! - A single-producer/single-consumer change queue

pub mod error;
pub mod queue;
pub mod registry;
pub mod watch;

pub use error::{Result, WatchError};
pub use queue::{ChangeConsumer, ChangeProducer, ChangeQueue};
pub use registry::{Registration, WatchHandle, WatchRegistry};
pub use watch::{DirectoryWatcher, WatcherControl, WatcherExit, WatcherState};

use std::fmt;
use std::path::PathBuf;

/// A path that may be stale, as reported by the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Absolute path of the changed entry
    pub path: PathBuf,
    /// Type of change
    pub kind: ChangeKind,
}

impl ChangeRecord {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Type of filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Entry created (or moved into a watched directory)
    Created,
    /// Entry contents or metadata modified
    Modified,
    /// Entry deleted (or moved out of a watched directory)
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Created => "create",
            ChangeKind::Modified => "modify",
            ChangeKind::Deleted => "delete",
        };
        f.write_str(name)
    }
}
