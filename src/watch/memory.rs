//! In-process directory watcher.
//!
//! [`MemoryWatcherFactory`] hands out watchers that never touch the OS
//! notification APIs. Callers inject synthetic events with
//! [`MemoryDirectoryWatcher::emit`]. A watch can only be added for a directory
//! that exists on disk, so retry behaviour can be exercised by creating the
//! directory later.

use crate::error::{FrameError, Result};
use crate::watch::directory::{
    DirectoryWatcher, DirectoryWatcherFactory, FsEvent, FsOp, WatchFault, WatchSenders,
    WatchStreams,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A directory watcher driven entirely by [`emit`](Self::emit) calls.
pub struct MemoryDirectoryWatcher {
    senders: Mutex<Option<WatchSenders>>,
    watched_paths: Mutex<Vec<PathBuf>>,
}

impl MemoryDirectoryWatcher {
    /// Create a watcher and the streams it feeds.
    pub fn new() -> (Self, WatchStreams) {
        let (senders, streams) = WatchStreams::channel();
        (
            Self {
                senders: Mutex::new(Some(senders)),
                watched_paths: Mutex::new(Vec::new()),
            },
            streams,
        )
    }

    /// Inject a filesystem event. Returns `false` once the watcher is closed.
    pub fn emit(&self, path: impl Into<PathBuf>, op: FsOp) -> bool {
        match self.senders.lock().as_ref() {
            Some(senders) => senders.events.send(FsEvent::new(path, op)).is_ok(),
            None => false,
        }
    }

    /// Inject a watch error. Returns `false` once the watcher is closed.
    pub fn emit_error(&self, message: impl Into<String>) -> bool {
        match self.senders.lock().as_ref() {
            Some(senders) => senders.errors.send(WatchFault(message.into())).is_ok(),
            None => false,
        }
    }

    /// Directories successfully registered with [`add_watch`](DirectoryWatcher::add_watch).
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched_paths.lock().clone()
    }
}

impl DirectoryWatcher for MemoryDirectoryWatcher {
    fn add_watch(&self, dir: &Path) -> Result<()> {
        if self.is_closed() {
            return Err(FrameError::Other("Watcher is closed".to_string()));
        }
        if !dir.is_dir() {
            return Err(FrameError::Other(format!(
                "No such directory: {}",
                dir.display()
            )));
        }

        let mut paths = self.watched_paths.lock();
        if !paths.iter().any(|p| p == dir) {
            paths.push(dir.to_path_buf());
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.senders.lock().take();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.senders.lock().is_none()
    }
}

/// Factory for [`MemoryDirectoryWatcher`]s that keeps a handle on every watcher it creates.
#[derive(Clone, Default)]
pub struct MemoryWatcherFactory {
    created: Arc<Mutex<Vec<Arc<MemoryDirectoryWatcher>>>>,
}

impl MemoryWatcherFactory {
    /// Create a new factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// All watchers created so far, in creation order.
    pub fn watchers(&self) -> Vec<Arc<MemoryDirectoryWatcher>> {
        self.created.lock().clone()
    }

    /// The most recently created watcher.
    pub fn last(&self) -> Option<Arc<MemoryDirectoryWatcher>> {
        self.created.lock().last().cloned()
    }
}

impl DirectoryWatcherFactory for MemoryWatcherFactory {
    fn create(&self) -> Result<(Arc<dyn DirectoryWatcher>, WatchStreams)> {
        let (watcher, streams) = MemoryDirectoryWatcher::new();
        let watcher = Arc::new(watcher);
        self.created.lock().push(Arc::clone(&watcher));
        Ok((watcher, streams))
    }
}
