//! Watcher error types

use std::path::PathBuf;

/// Result type for watcher operations
pub type Result<T> = std::result::Result<T, WatchError>;

/// Errors raised while establishing watches
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Reading a directory's metadata failed
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Walking the directory tree failed
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// The notification backend refused a watch
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// Watch root is not a directory
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}

impl WatchError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
