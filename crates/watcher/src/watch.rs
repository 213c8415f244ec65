//! Recursive directory watcher
//!
//! Registers one non-recursive watch per directory and extends coverage as
//! directories are created. Every relevant event becomes a [`ChangeRecord`] on
//! the change queue.

use crate::queue::ChangeProducer;
use crate::registry::{Registration, WatchHandle, WatchRegistry};
use crate::{ChangeKind, ChangeRecord, Result, WatchError};
use crossbeam_channel::{Receiver, Sender};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs;
use std::iter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Lifecycle of a [`DirectoryWatcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Initializing,
    Scanning,
    Running,
    Stopped,
}

/// Why the event loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherExit {
    /// Blocking wait was interrupted
    Interrupted,
    /// Disable flag observed between batches
    Disabled,
    /// Every registration became invalid
    Exhausted,
}

enum Message {
    Event(notify::Result<Event>),
    Interrupt,
}

struct Shared {
    state: Mutex<WatcherState>,
    enabled: AtomicBool,
}

/// Cloneable handle for toggling and observing a running watcher
#[derive(Clone)]
pub struct WatcherControl {
    shared: Arc<Shared>,
    tx: Sender<Message>,
}

impl WatcherControl {
    pub fn state(&self) -> WatcherState {
        *self.shared.state.lock()
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Allow the loop to keep processing batches
    pub fn enable(&self) {
        self.shared.enabled.store(true, Ordering::SeqCst);
    }

    /// Stop the loop after its current batch
    ///
    /// Does not wake a blocked wait; pair with [`interrupt`](Self::interrupt)
    /// for a prompt stop.
    pub fn disable(&self) {
        self.shared.enabled.store(false, Ordering::SeqCst);
    }

    /// Wake the blocking wait and end the loop
    pub fn interrupt(&self) {
        // Receiver already gone means the loop has exited
        let _ = self.tx.send(Message::Interrupt);
    }
}

/// Watches a directory tree, one registration per directory
pub struct DirectoryWatcher {
    root: PathBuf,
    backend: RecommendedWatcher,
    events: Receiver<Message>,
    tx: Sender<Message>,
    registry: WatchRegistry,
    queue: ChangeProducer,
    shared: Arc<Shared>,
    /// Log registrations individually once the initial scan is done
    trace: bool,
}

impl DirectoryWatcher {
    /// Register `root` and every directory beneath it
    ///
    /// Fails if any part of the tree cannot be read. Nothing stays watched on
    /// failure.
    pub fn new(root: impl AsRef<Path>, queue: ChangeProducer) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(WatcherState::Initializing),
            enabled: AtomicBool::new(true),
        });

        let root = root.as_ref();
        let root = fs::canonicalize(root).map_err(|e| WatchError::io(root, e))?;
        if !root.is_dir() {
            return Err(WatchError::NotADirectory(root));
        }

        let (tx, events) = crossbeam_channel::unbounded();
        let event_tx = tx.clone();
        let backend = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = event_tx.send(Message::Event(res));
        })?;

        let mut watcher = Self {
            root,
            backend,
            events,
            tx,
            registry: WatchRegistry::new(),
            queue,
            shared,
            trace: false,
        };

        watcher.set_state(WatcherState::Scanning);
        info!("Scanning {} ...", watcher.root.display());
        let root = watcher.root.clone();
        watcher.register_all(&root)?;
        info!("Scan complete ({} directories)", watcher.registry.len());

        watcher.trace = true;
        watcher.set_state(WatcherState::Running);
        Ok(watcher)
    }

    /// Canonical watch root
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn control(&self) -> WatcherControl {
        WatcherControl {
            shared: Arc::clone(&self.shared),
            tx: self.tx.clone(),
        }
    }

    pub fn registration_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_watching(&self, dir: &Path) -> bool {
        self.registry.contains_path(dir)
    }

    /// Register a single directory
    ///
    /// Registering a directory that is already watched refreshes its path and
    /// leaves the registration count unchanged.
    pub fn register(&mut self, dir: &Path) -> Result<Registration> {
        let handle = WatchHandle::of(dir).map_err(|e| WatchError::io(dir, e))?;
        self.backend.watch(dir, RecursiveMode::NonRecursive)?;

        let registration = self.registry.insert(handle, dir.to_path_buf());
        match &registration {
            Registration::New if self.trace => info!("register: {}", dir.display()),
            Registration::Updated { previous } if self.trace => {
                info!("update: {} -> {}", previous.display(), dir.display())
            }
            _ => debug!("register: {}", dir.display()),
        }
        Ok(registration)
    }

    /// Register `start` and all directories beneath it, without following links
    pub fn register_all(&mut self, start: &Path) -> Result<usize> {
        let mut count = 0;
        for entry in WalkDir::new(start).follow_links(false) {
            let entry = entry?;
            if entry.file_type().is_dir() {
                self.register(entry.path())?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Run the loop on a dedicated named thread
    pub fn spawn(self) -> std::io::Result<thread::JoinHandle<WatcherExit>> {
        let name = match self.root.file_name() {
            Some(name) => format!("watch:{}", name.to_string_lossy()),
            None => "watch:/".to_string(),
        };
        thread::Builder::new().name(name).spawn(move || self.run())
    }

    /// Process event batches until interrupted, disabled or out of directories
    pub fn run(mut self) -> WatcherExit {
        info!("Watching {} ({} directories)", self.root.display(), self.registry.len());

        let exit = loop {
            if !self.shared.enabled.load(Ordering::SeqCst) {
                info!("Event processing disabled for {}", self.root.display());
                break WatcherExit::Disabled;
            }

            let batch = match self.next_batch() {
                Some(batch) => batch,
                None => break WatcherExit::Interrupted,
            };

            self.process_batch(batch);

            if self.registry.is_empty() {
                info!("No watched directories left under {}", self.root.display());
                break WatcherExit::Exhausted;
            }
        };

        self.set_state(WatcherState::Stopped);
        info!("Watcher stopped ({:?})", exit);
        if !self.queue.is_empty() {
            debug!("{} changes still queued", self.queue.len());
        }
        if self.queue.dropped() > 0 {
            warn!("{} changes dropped from a full queue", self.queue.dropped());
        }
        exit
    }

    /// Block for one message, then take everything already pending
    fn next_batch(&self) -> Option<Vec<Event>> {
        // `self.tx` keeps the channel connected
        let first = self.events.recv().ok()?;

        let mut batch = Vec::new();
        for message in iter::once(first).chain(self.events.try_iter()) {
            match message {
                Message::Event(Ok(event)) => batch.push(event),
                Message::Event(Err(e)) => warn!("Watch error: {}", e),
                Message::Interrupt => {
                    info!("Watch interrupted");
                    return None;
                }
            }
        }
        Some(batch)
    }

    fn process_batch(&mut self, batch: Vec<Event>) {
        let mut touched = HashSet::new();

        for event in batch {
            if event.need_rescan() {
                warn!(
                    "Notification queue overflowed under {}, changes may have been missed",
                    self.root.display()
                );
            }
            for (path, kind) in classify(&event) {
                self.apply(path, kind, &mut touched);
            }
        }

        self.validate(touched);
    }

    fn apply(&mut self, path: PathBuf, kind: ChangeKind, touched: &mut HashSet<WatchHandle>) {
        // A watched directory reported by path gets rechecked, and so does
        // everything registered beneath it when it went away
        if let Some(handle) = self.registry.handle_for(&path) {
            touched.insert(handle);
            if kind == ChangeKind::Deleted {
                touched.extend(self.handles_under(&path));
            }
        }

        let owner = path
            .parent()
            .and_then(|parent| self.registry.handle_for(parent));
        let owner = match owner {
            Some(handle) => handle,
            None if self.registry.contains_path(&path) => {
                debug!("{} on watched directory {}", kind, path.display());
                return;
            }
            None => {
                warn!("Unsupported file event for unwatched path {}", path.display());
                return;
            }
        };
        touched.insert(owner);

        debug!("{}: {}", kind, path.display());

        let is_new_dir = kind == ChangeKind::Created
            && fs::symlink_metadata(&path)
                .map(|meta| meta.is_dir())
                .unwrap_or(false);

        if let Some(evicted) = self.queue.push(ChangeRecord::new(path.clone(), kind)) {
            debug!("Change queue full, dropped {}", evicted.path.display());
        }

        if is_new_dir {
            if let Err(e) = self.register_all(&path) {
                warn!("Failed to watch new directory {}: {}", path.display(), e);
            }
        }
    }

    fn handles_under(&self, dir: &Path) -> Vec<WatchHandle> {
        self.registry
            .paths()
            .filter(|p| p.starts_with(dir))
            .filter_map(|p| self.registry.handle_for(p))
            .collect()
    }

    /// Drop registrations whose directory no longer exists as registered
    fn validate(&mut self, touched: HashSet<WatchHandle>) {
        for handle in touched {
            if self.registry.is_valid(handle) {
                continue;
            }
            let Some(dir) = self.registry.remove(handle) else {
                continue;
            };
            info!("unregister: {}", dir.display());

            // Path may already belong to a directory recreated in this batch
            if !self.registry.contains_path(&dir) {
                if let Err(e) = self.backend.unwatch(&dir) {
                    debug!("unwatch {}: {}", dir.display(), e);
                }
            }
        }
    }

    fn set_state(&self, state: WatcherState) {
        *self.shared.state.lock() = state;
    }
}

/// Map a backend event onto (path, kind) pairs
///
/// Access events carry no change and map to nothing.
fn classify(event: &Event) -> Vec<(PathBuf, ChangeKind)> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(_) => ChangeKind::Deleted,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Deleted,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Created,
        // inotify and Windows also report each side on its own
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => return Vec::new(),
        EventKind::Modify(ModifyKind::Name(_)) => {
            return event
                .paths
                .iter()
                .map(|path| {
                    let kind = if fs::symlink_metadata(path).is_ok() {
                        ChangeKind::Created
                    } else {
                        ChangeKind::Deleted
                    };
                    (path.clone(), kind)
                })
                .collect();
        }
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };

    event.paths.iter().map(|path| (path.clone(), kind)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{ChangeConsumer, ChangeQueue};
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn watcher_on(dir: &Path) -> (DirectoryWatcher, ChangeConsumer) {
        let (tx, rx) = ChangeQueue::unbounded();
        (DirectoryWatcher::new(dir, tx).unwrap(), rx)
    }

    fn event(kind: EventKind, path: &Path) -> Event {
        Event::new(kind).add_path(path.to_path_buf())
    }

    fn drain(rx: &ChangeConsumer) -> Vec<ChangeRecord> {
        iter::from_fn(|| rx.poll()).collect()
    }

    #[test]
    fn test_initial_scan_registers_every_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("a/b/c")).unwrap();
        fs::create_dir_all(temp_dir.path().join("d")).unwrap();
        fs::write(temp_dir.path().join("a/file.txt"), b"x").unwrap();

        let (watcher, rx) = watcher_on(temp_dir.path());
        let root = watcher.root().to_path_buf();

        // root, a, a/b, a/b/c, d
        assert_eq!(watcher.registration_count(), 5);
        assert!(watcher.is_watching(&root));
        assert!(watcher.is_watching(&root.join("a/b/c")));
        assert!(!watcher.is_watching(&root.join("a/file.txt")));
        assert_eq!(watcher.control().state(), WatcherState::Running);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_missing_root_fails() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, _rx) = ChangeQueue::unbounded();

        let result = DirectoryWatcher::new(temp_dir.path().join("nope"), tx);
        assert!(matches!(result, Err(WatchError::Io { .. })));
    }

    #[test]
    fn test_file_root_fails() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, b"a").unwrap();
        let (tx, _rx) = ChangeQueue::unbounded();

        let result = DirectoryWatcher::new(&file, tx);
        assert!(matches!(result, Err(WatchError::NotADirectory(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subtree_fails_construction() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let locked = temp_dir.path().join("locked");
        fs::create_dir_all(locked.join("inner")).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores permission bits
        let readable = fs::read_dir(&locked).is_ok();

        let (tx, _rx) = ChangeQueue::unbounded();
        let result = DirectoryWatcher::new(temp_dir.path(), tx);

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        if !readable {
            assert!(result.is_err());
        }
    }

    #[test]
    fn test_register_twice_keeps_count() {
        let temp_dir = TempDir::new().unwrap();
        let (mut watcher, _rx) = watcher_on(temp_dir.path());
        let root = watcher.root().to_path_buf();

        assert_eq!(watcher.registration_count(), 1);
        assert_eq!(watcher.register(&root).unwrap(), Registration::Unchanged);
        assert_eq!(watcher.register_all(&root).unwrap(), 1);
        assert_eq!(watcher.registration_count(), 1);
    }

    #[test]
    fn test_batch_emits_records_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let (mut watcher, rx) = watcher_on(temp_dir.path());
        let root = watcher.root().to_path_buf();

        let a = root.join("a.txt");
        let b = root.join("b.txt");
        watcher.process_batch(vec![
            event(EventKind::Create(CreateKind::File), &a),
            event(EventKind::Modify(ModifyKind::Data(DataChange::Any)), &a),
            event(EventKind::Access(AccessKind::Any), &a),
            event(EventKind::Remove(RemoveKind::File), &b),
        ]);

        assert_eq!(
            drain(&rx),
            vec![
                ChangeRecord::new(&a, ChangeKind::Created),
                ChangeRecord::new(&a, ChangeKind::Modified),
                ChangeRecord::new(&b, ChangeKind::Deleted),
            ]
        );
    }

    #[test]
    fn test_created_directory_is_registered_recursively() {
        let temp_dir = TempDir::new().unwrap();
        let (mut watcher, rx) = watcher_on(temp_dir.path());
        let root = watcher.root().to_path_buf();

        let sub = root.join("sub");
        fs::create_dir_all(sub.join("deeper")).unwrap();
        watcher.process_batch(vec![event(EventKind::Create(CreateKind::Folder), &sub)]);

        assert!(watcher.is_watching(&sub));
        assert!(watcher.is_watching(&sub.join("deeper")));
        assert_eq!(watcher.registration_count(), 3);
        assert_eq!(drain(&rx), vec![ChangeRecord::new(&sub, ChangeKind::Created)]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_is_not_followed() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let (mut watcher, rx) = watcher_on(temp_dir.path());
        let root = watcher.root().to_path_buf();

        let link = root.join("link");
        std::os::unix::fs::symlink(outside.path(), &link).unwrap();
        watcher.process_batch(vec![event(EventKind::Create(CreateKind::Any), &link)]);

        assert_eq!(watcher.registration_count(), 1);
        assert_eq!(drain(&rx), vec![ChangeRecord::new(&link, ChangeKind::Created)]);
    }

    #[test]
    fn test_unknown_directory_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let (mut watcher, rx) = watcher_on(temp_dir.path());

        watcher.process_batch(vec![event(
            EventKind::Create(CreateKind::File),
            &elsewhere.path().join("x.txt"),
        )]);

        assert!(rx.is_empty());
        assert_eq!(watcher.registration_count(), 1);
    }

    #[test]
    fn test_deleted_subdirectory_is_unregistered() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("sub/inner")).unwrap();
        let (mut watcher, rx) = watcher_on(temp_dir.path());
        let root = watcher.root().to_path_buf();
        let sub = root.join("sub");
        assert_eq!(watcher.registration_count(), 3);

        fs::remove_dir_all(&sub).unwrap();
        watcher.process_batch(vec![event(EventKind::Remove(RemoveKind::Folder), &sub)]);

        assert!(!watcher.is_watching(&sub));
        assert!(!watcher.is_watching(&sub.join("inner")));
        assert_eq!(watcher.registration_count(), 1);
        assert_eq!(drain(&rx), vec![ChangeRecord::new(&sub, ChangeKind::Deleted)]);
    }

    #[test]
    fn test_rename_sides_map_to_delete_and_create() {
        let temp_dir = TempDir::new().unwrap();
        let (mut watcher, rx) = watcher_on(temp_dir.path());
        let root = watcher.root().to_path_buf();
        let from = root.join("from.txt");
        let to = root.join("to.txt");

        watcher.process_batch(vec![
            event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &from),
            event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &to),
            Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
                .add_path(from.clone())
                .add_path(to.clone()),
        ]);

        assert_eq!(
            drain(&rx),
            vec![
                ChangeRecord::new(&from, ChangeKind::Deleted),
                ChangeRecord::new(&to, ChangeKind::Created),
            ]
        );
    }

    #[test]
    fn test_disabled_watcher_exits_before_waiting() {
        let temp_dir = TempDir::new().unwrap();
        let (watcher, _rx) = watcher_on(temp_dir.path());
        let control = watcher.control();

        control.disable();
        assert_eq!(watcher.run(), WatcherExit::Disabled);
        assert_eq!(control.state(), WatcherState::Stopped);
    }

    #[test]
    fn test_interrupt_ends_blocking_wait() {
        let temp_dir = TempDir::new().unwrap();
        let (watcher, _rx) = watcher_on(temp_dir.path());
        let control = watcher.control();

        let handle = watcher.spawn().unwrap();
        control.interrupt();

        assert_eq!(handle.join().unwrap(), WatcherExit::Interrupted);
        assert_eq!(control.state(), WatcherState::Stopped);
    }

    #[test]
    fn test_loop_ends_when_root_is_deleted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        fs::create_dir_all(root.join("sub")).unwrap();
        let (watcher, _rx) = watcher_on(&root);
        let control = watcher.control();

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            let _ = done_tx.send(watcher.run());
        });

        fs::remove_dir_all(&root).unwrap();

        let exit = done_rx.recv_timeout(Duration::from_secs(10));
        if exit.is_err() {
            control.interrupt();
        }
        assert_eq!(exit.unwrap(), WatcherExit::Exhausted);
    }

    #[test]
    fn test_live_file_creation_is_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let (watcher, rx) = watcher_on(temp_dir.path());
        let root = watcher.root().to_path_buf();
        let control = watcher.control();
        let _handle = watcher.spawn().unwrap();

        let file = root.join("a.txt");
        fs::File::create(&file).unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut found = false;
        while !found && Instant::now() < deadline {
            match rx.poll() {
                Some(record) => found = record.path == file,
                None => thread::sleep(Duration::from_millis(20)),
            }
        }
        control.interrupt();
        assert!(found, "no change record for {}", file.display());
    }
}
