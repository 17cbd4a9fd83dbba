//! Directory watching backed by the `notify` crate.

use crate::error::{FrameError, Result};
use crate::watch::directory::{
    DirectoryWatcher, DirectoryWatcherFactory, FsEvent, FsOp, WatchFault, WatchStreams,
};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directory watcher using the platform's recommended notification backend.
///
/// Raw `notify` events are translated into [`FsEvent`]s with fsnotify-style
/// operations: a rename into the directory is reported as [`FsOp::Create`], a
/// rename away as [`FsOp::Rename`]. Access events are dropped.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_daemon::watch::{DirectoryWatcher, NotifyDirectoryWatcher};
///
/// # async fn example() -> hotswap_daemon::error::Result<()> {
/// let (watcher, mut streams) = NotifyDirectoryWatcher::new()?;
/// watcher.add_watch(std::path::Path::new("/etc/myapp"))?;
///
/// while let Some(event) = streams.events.recv().await {
///     println!("{} {}", event.op, event.path.display());
/// }
/// # Ok(())
/// # }
/// ```
pub struct NotifyDirectoryWatcher {
    watcher: Mutex<Option<RecommendedWatcher>>,
    watched_paths: Mutex<Vec<PathBuf>>,
}

impl NotifyDirectoryWatcher {
    /// Create a new watcher and the streams it feeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying file watcher cannot be created.
    pub fn new() -> Result<(Self, WatchStreams)> {
        let (senders, streams) = WatchStreams::channel();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let Some(op) = classify(&event.kind) else {
                    return;
                };
                for path in event.paths {
                    let _ = senders.events.send(FsEvent::new(path, op));
                }
            }
            Err(e) => {
                let _ = senders.errors.send(WatchFault(e.to_string()));
            }
        })
        .map_err(|e| FrameError::Other(format!("Failed to create file watcher: {}", e)))?;

        Ok((
            Self {
                watcher: Mutex::new(Some(watcher)),
                watched_paths: Mutex::new(Vec::new()),
            },
            streams,
        ))
    }

    /// Get a list of currently watched paths.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched_paths.lock().clone()
    }
}

impl DirectoryWatcher for NotifyDirectoryWatcher {
    fn add_watch(&self, dir: &Path) -> Result<()> {
        // Canonicalize the path to get the absolute path
        let canonical_path = dir
            .canonicalize()
            .map_err(|e| FrameError::Other(format!("Failed to resolve path: {}", e)))?;

        let mut guard = self.watcher.lock();
        let watcher = guard
            .as_mut()
            .ok_or_else(|| FrameError::Other("Watcher is closed".to_string()))?;
        watcher
            .watch(&canonical_path, RecursiveMode::NonRecursive)
            .map_err(|e| FrameError::Other(format!("Failed to watch path: {}", e)))?;

        let mut paths = self.watched_paths.lock();
        if !paths.contains(&canonical_path) {
            paths.push(canonical_path);
        }

        Ok(())
    }

    fn close(&self) -> Result<()> {
        // Dropping the backend drops its event handler and with it both senders.
        self.watcher.lock().take();
        self.watched_paths.lock().clear();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.watcher.lock().is_none()
    }
}

/// Map a `notify` event kind onto the operation set config watchers understand.
fn classify(kind: &EventKind) -> Option<FsOp> {
    match kind {
        EventKind::Create(_) => Some(FsOp::Create),
        EventKind::Remove(_) => Some(FsOp::Remove),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(FsOp::Create),
        EventKind::Modify(ModifyKind::Name(_)) => Some(FsOp::Rename),
        EventKind::Modify(ModifyKind::Metadata(_)) => Some(FsOp::Chmod),
        EventKind::Modify(_) => Some(FsOp::Write),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

/// Factory producing [`NotifyDirectoryWatcher`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyWatcherFactory;

impl DirectoryWatcherFactory for NotifyWatcherFactory {
    fn create(&self) -> Result<(Arc<dyn DirectoryWatcher>, WatchStreams)> {
        let (watcher, streams) = NotifyDirectoryWatcher::new()?;
        Ok((Arc::new(watcher), streams))
    }
}
