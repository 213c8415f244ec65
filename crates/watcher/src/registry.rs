//! Watch registrations keyed by directory identity
//!
//! A directory keeps its handle for as long as it exists, even if the path that
//! leads to it changes. Registering it again refreshes the path and never
//! creates a second entry.

use same_file::Handle;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};

/// Opaque identity of a watched directory
///
/// Derived from the OS file identity (device and inode on unix, volume and
/// file index on Windows), so it survives renames. No descriptor is held open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(u64);

impl WatchHandle {
    /// Read the identity of the directory at `dir`
    pub fn of(dir: &Path) -> io::Result<Self> {
        let handle = Handle::from_path(dir)?;
        if !handle.as_file().metadata()?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} is not a directory", dir.display()),
            ));
        }
        Ok(Self(handle_key(&handle)))
    }
}

fn handle_key(handle: &Handle) -> u64 {
    let mut hasher = DefaultHasher::new();
    handle.hash(&mut hasher);
    hasher.finish()
}

/// Outcome of registering a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// First time this handle was seen
    New,
    /// Known handle, now reachable under a different path
    Updated { previous: PathBuf },
    /// Known handle, same path
    Unchanged,
}

/// Active set of watch registrations
#[derive(Debug, Default)]
pub struct WatchRegistry {
    by_handle: HashMap<WatchHandle, PathBuf>,
    by_path: HashMap<PathBuf, WatchHandle>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `dir` under `handle`
    pub fn insert(&mut self, handle: WatchHandle, dir: PathBuf) -> Registration {
        match self.by_handle.insert(handle, dir.clone()) {
            None => {
                self.by_path.insert(dir, handle);
                Registration::New
            }
            Some(previous) if previous == dir => Registration::Unchanged,
            Some(previous) => {
                if self.by_path.get(&previous) == Some(&handle) {
                    self.by_path.remove(&previous);
                }
                self.by_path.insert(dir, handle);
                Registration::Updated { previous }
            }
        }
    }

    /// Drop a registration, returning the path it covered
    pub fn remove(&mut self, handle: WatchHandle) -> Option<PathBuf> {
        let dir = self.by_handle.remove(&handle)?;
        if self.by_path.get(&dir) == Some(&handle) {
            self.by_path.remove(&dir);
        }
        Some(dir)
    }

    /// Handle registered for exactly this directory path
    pub fn handle_for(&self, dir: &Path) -> Option<WatchHandle> {
        self.by_path.get(dir).copied()
    }

    pub fn path_of(&self, handle: WatchHandle) -> Option<&Path> {
        self.by_handle.get(&handle).map(PathBuf::as_path)
    }

    pub fn contains_path(&self, dir: &Path) -> bool {
        self.by_path.contains_key(dir)
    }

    /// A registration is valid while its path still leads to the same directory
    pub fn is_valid(&self, handle: WatchHandle) -> bool {
        match self.path_of(handle) {
            Some(dir) => matches!(WatchHandle::of(dir), Ok(h) if h == handle),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.by_handle.values().map(PathBuf::as_path)
    }
}
