//! Refresh hook adapters
//!
//! A refresh hook is any `FnMut(&Path) + Send + 'static`. It is called once per
//! dequeued change with the path that should be refreshed.

use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::debug;

/// Forward each stale path as a message
///
/// Paths sent after the receiver is dropped are discarded.
pub fn channel(tx: mpsc::UnboundedSender<PathBuf>) -> impl FnMut(&Path) + Send + 'static {
    move |path: &Path| {
        if tx.send(path.to_path_buf()).is_err() {
            debug!("Refresh receiver closed, dropping {}", path.display());
        }
    }
}
