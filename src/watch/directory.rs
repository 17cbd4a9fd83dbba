//! Directory watch collaborator interface.
//!
//! A [`ConfigWatcher`](crate::watch::ConfigWatcher) never talks to the OS directly.
//! It asks a [`DirectoryWatcherFactory`] for one [`DirectoryWatcher`] plus the pair
//! of streams that watcher feeds, and multiplexes over those streams. Closing the
//! watcher closes both streams, which is how watch loops terminate.

use crate::error::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Filesystem operation reported for a watched directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsOp {
    /// An entry appeared (also reported for a rename into the directory).
    Create,
    /// An entry's content changed.
    Write,
    /// An entry was removed.
    Remove,
    /// An entry was renamed away.
    Rename,
    /// An entry's metadata changed.
    Chmod,
}

impl fmt::Display for FsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "CREATE",
            Self::Write => "WRITE",
            Self::Remove => "REMOVE",
            Self::Rename => "RENAME",
            Self::Chmod => "CHMOD",
        };
        f.write_str(name)
    }
}

/// A single filesystem event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    /// Path the event refers to
    pub path: PathBuf,
    /// What happened
    pub op: FsOp,
}

impl FsEvent {
    /// Create a new event.
    pub fn new(path: impl Into<PathBuf>, op: FsOp) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }
}

/// Error reported asynchronously by a directory watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchFault(pub String);

impl fmt::Display for WatchFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receiving halves fed by a [`DirectoryWatcher`].
///
/// Both receivers yield `None` once the watcher is closed.
pub struct WatchStreams {
    /// Filesystem events
    pub events: mpsc::UnboundedReceiver<FsEvent>,
    /// Watch errors
    pub errors: mpsc::UnboundedReceiver<WatchFault>,
}

impl WatchStreams {
    /// Create a connected pair of senders and streams.
    pub fn channel() -> (WatchSenders, WatchStreams) {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();
        (
            WatchSenders {
                events: event_tx,
                errors: error_tx,
            },
            WatchStreams { events, errors },
        )
    }
}

/// Sending halves matching a [`WatchStreams`]. Dropping them closes the streams.
#[derive(Clone)]
pub struct WatchSenders {
    /// Filesystem events
    pub events: mpsc::UnboundedSender<FsEvent>,
    /// Watch errors
    pub errors: mpsc::UnboundedSender<WatchFault>,
}

/// A handle onto an OS-level (or simulated) directory watch.
pub trait DirectoryWatcher: Send + Sync {
    /// Start watching `dir` non-recursively.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be watched (e.g. it does not exist)
    /// or the watcher was already closed.
    fn add_watch(&self, dir: &Path) -> Result<()>;

    /// Release the watch. Both streams close once this returns.
    ///
    /// Closing twice is a no-op.
    fn close(&self) -> Result<()>;

    /// Whether [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;
}

/// Creates one [`DirectoryWatcher`] per configuration key.
pub trait DirectoryWatcherFactory: Send + Sync {
    /// Create a watcher and the streams it feeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying watch facility cannot be created.
    fn create(&self) -> Result<(Arc<dyn DirectoryWatcher>, WatchStreams)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_streams_close_with_senders() {
        let (senders, mut streams) = WatchStreams::channel();
        senders
            .events
            .send(FsEvent::new("/tmp/routes.json", FsOp::Write))
            .unwrap();
        drop(senders);

        let event = streams.events.recv().await.unwrap();
        assert_eq!(event.op, FsOp::Write);
        assert!(streams.events.recv().await.is_none());
        assert!(streams.errors.recv().await.is_none());
    }

    #[test]
    fn test_op_display() {
        assert_eq!(FsOp::Create.to_string(), "CREATE");
        assert_eq!(FsOp::Rename.to_string(), "RENAME");
    }
}
