//! Configuration file watching.
//!
//! Each configured key gets a [`ConfigWatcher`] that watches the key's parent
//! directory through a [`DirectoryWatcher`], reloads the file when it changes,
//! skips byte-identical content, and dispatches typed callbacks. The
//! [`ConfigWatcherManager`] owns the watchers of one process.

mod callbacks;
mod config_watcher;
mod directory;
#[cfg(feature = "file-watch")]
mod fs;
mod handler;
mod manager;
mod memory;
mod registration;

pub use callbacks::{CallbackId, CallbackRegistry, CallbackType};
pub use config_watcher::{ConfigWatcher, ConfigWatcherInfo, EventDisposition, LoadOutcome};
pub use directory::{
    DirectoryWatcher, DirectoryWatcherFactory, FsEvent, FsOp, WatchFault, WatchSenders,
    WatchStreams,
};
#[cfg(feature = "file-watch")]
pub use fs::{NotifyDirectoryWatcher, NotifyWatcherFactory};
pub use handler::{ConfigFormat, ConfigHandler, TypedConfig};
pub use manager::{ConfigWatcherManager, TEMPLATE_DIR, resolve_path};
pub use memory::{MemoryDirectoryWatcher, MemoryWatcherFactory};
pub use registration::{ConfigRegistration, ConfigRegistry, DEFAULT_RETRY_WATCH_INTERVAL};
