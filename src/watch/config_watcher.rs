//! The per-key configuration watch state machine.
//!
//! ```text
//! Unwatched ──add_watch ok──▶ Watched ──start()──▶ Active ──close──▶ Closed
//!     │                          ▲
//!     └──add_watch err (retry)───┘
//! ```

use crate::error::{FrameError, Result};
use crate::watch::callbacks::{CallbackId, CallbackRegistry, CallbackType};
use crate::watch::directory::{DirectoryWatcher, DirectoryWatcherFactory, FsEvent, FsOp, WatchStreams};
use crate::watch::handler::{ConfigHandler, TypedConfig};
use crate::watch::registration::ConfigRegistration;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[cfg(feature = "metrics")]
use crate::metrics::WatcherMetrics;

type ContentHash = [u8; 32];

/// Result of a single reload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The file was empty; nothing changed.
    Empty,
    /// The content hashed identically to the last loaded content.
    Unchanged,
    /// New content was decoded and published as `version`.
    Updated {
        /// Version after the reload
        version: u64,
    },
}

/// What the active loop did with a filesystem event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// The event was dropped without callbacks or reload.
    Ignored,
    /// Typed callbacks ran (possibly zero of them) and no reload happened.
    Callbacks(usize),
    /// The file was reloaded.
    Reloaded(LoadOutcome),
    /// A reload was attempted and failed; the previous model is retained.
    ReloadFailed,
}

/// Serializable snapshot of a watcher's runtime state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigWatcherInfo {
    /// Configuration key
    pub key: String,
    /// Full path of the watched file
    pub path: PathBuf,
    /// Watched directory
    pub dir: PathBuf,
    /// File name within `dir`
    pub file_name: String,
    /// Number of content-distinct successful reloads
    pub version: u64,
    /// When `version` last changed
    pub update_timestamp: Option<DateTime<Utc>>,
    /// Whether the directory watch is established
    pub watched: bool,
    /// Hex digest of the last loaded content
    pub content_hash: Option<String>,
    /// Current model as serialized by the handler
    pub config_data: String,
}

#[derive(Debug, Default)]
struct WatchState {
    content_hash: Option<ContentHash>,
    version: u64,
    update_timestamp: Option<DateTime<Utc>>,
    watched: bool,
}

/// Watches one configuration key's file and propagates changes.
///
/// The watcher keeps a content hash so byte-identical reloads are no-ops, a
/// version that grows by one per content-distinct successful reload, and three
/// callback lists (create / update / remove).
///
/// Runtime state is guarded by a reader-writer lock, so introspection from
/// other tasks never races the watch loop. Reloads are serialized per key.
pub struct ConfigWatcher {
    key: String,
    path: PathBuf,
    dir: PathBuf,
    file_name: String,
    enable_watch_log: bool,
    retry_watch_interval: Duration,
    handler: Arc<dyn ConfigHandler>,
    callbacks: CallbackRegistry,
    state: RwLock<WatchState>,
    reload_lock: Mutex<()>,
    dir_watcher: Arc<dyn DirectoryWatcher>,
    streams: Mutex<Option<WatchStreams>>,
    watched_signal: Notify,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    #[cfg(feature = "metrics")]
    metrics: Option<WatcherMetrics>,
}

impl ConfigWatcher {
    /// Set up a watcher for `key` backed by the file at `path`.
    ///
    /// Tries to watch the file's parent directory. On success the file is loaded
    /// immediately. If the directory cannot be watched, a background retry loop
    /// keeps trying every `retry_watch_interval` until it succeeds, then performs
    /// the initial load.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// With `must_load`, fails if the directory cannot be watched or the initial
    /// load fails. Without it, only fails if the watch facility itself cannot be
    /// created.
    pub fn initialize(
        key: impl Into<String>,
        path: impl AsRef<Path>,
        registration: &ConfigRegistration,
        factory: &dyn DirectoryWatcherFactory,
    ) -> Result<Arc<Self>> {
        Self::setup(
            key.into(),
            path.as_ref(),
            registration,
            factory,
            #[cfg(feature = "metrics")]
            None,
        )
    }

    /// Like [`initialize`](Self::initialize), recording reload metrics.
    #[cfg(feature = "metrics")]
    pub fn initialize_with_metrics(
        key: impl Into<String>,
        path: impl AsRef<Path>,
        registration: &ConfigRegistration,
        factory: &dyn DirectoryWatcherFactory,
        metrics: WatcherMetrics,
    ) -> Result<Arc<Self>> {
        Self::setup(key.into(), path.as_ref(), registration, factory, Some(metrics))
    }

    fn setup(
        key: String,
        path: &Path,
        registration: &ConfigRegistration,
        factory: &dyn DirectoryWatcherFactory,
        #[cfg(feature = "metrics")] metrics: Option<WatcherMetrics>,
    ) -> Result<Arc<Self>> {
        let setup_error = |reason: String| FrameError::ConfigWatchSetup {
            key: key.clone(),
            reason,
        };

        let runtime = Handle::try_current().map_err(|e| setup_error(e.to_string()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| setup_error(format!("'{}' does not name a file", path.display())))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let handler = registration.new_handler();
        if registration.suffix_conflicts(handler.as_ref()) {
            warn!(
                key = %key,
                suffix = registration.suffix(),
                decodes = ?handler.payload_format(),
                "file suffix does not match the handler format"
            );
        }

        let (dir_watcher, streams) = factory
            .create()
            .map_err(|e| setup_error(format!("failed to create watcher, {}", e)))?;

        let watcher = Arc::new(Self {
            key: key.clone(),
            path: dir.join(&file_name),
            dir,
            file_name,
            enable_watch_log: registration.watch_log_enabled(),
            retry_watch_interval: registration.retry_watch_interval(),
            handler,
            callbacks: CallbackRegistry::new(),
            state: RwLock::new(WatchState::default()),
            reload_lock: Mutex::new(()),
            dir_watcher,
            streams: Mutex::new(Some(streams)),
            watched_signal: Notify::new(),
            tasks: Mutex::new(Vec::new()),
            #[cfg(feature = "metrics")]
            metrics,
        });

        if let Err(e) = watcher.dir_watcher.add_watch(&watcher.dir) {
            warn!(
                key = %key,
                dir = %watcher.dir.display(),
                error = %e,
                "unable to watch configuration directory"
            );
            if registration.must_load() {
                let _ = watcher.dir_watcher.close();
                return Err(setup_error(e.to_string()));
            }

            let retry = runtime.spawn(Arc::clone(&watcher).retry_watch());
            watcher.tasks.lock().push(retry);
            return Ok(watcher);
        }
        watcher.state.write().watched = true;

        if let Err(e) = watcher.load_file() {
            warn!(
                key = %key,
                path = %watcher.path.display(),
                error = %e,
                "failed to load configuration"
            );
            if registration.must_load() {
                let _ = watcher.dir_watcher.close();
                return Err(match e {
                    FrameError::IoError(io) => setup_error(io.to_string()),
                    other => other,
                });
            }
        }

        info!(
            key = %key,
            dir = %watcher.dir.display(),
            path = %watcher.path.display(),
            "initialized configuration watcher"
        );
        Ok(watcher)
    }

    /// Spawn the active watch loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher was already started or no Tokio runtime is available.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let runtime = Handle::try_current().map_err(|e| FrameError::Other(e.to_string()))?;
        let streams = self.streams.lock().take().ok_or_else(|| {
            FrameError::Other(format!("configuration watcher '{}' already started", self.key))
        })?;

        let task = runtime.spawn(Arc::clone(self).run(streams));
        self.tasks.lock().push(task);
        Ok(())
    }

    /// Close the directory watch, which ends the watch loop and any retry loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying watch handle fails to close.
    pub fn stop(&self) -> Result<()> {
        let result = self.dir_watcher.close();
        self.watched_signal.notify_one();
        result
    }

    /// Wait until every background task of this watcher has finished.
    pub async fn closed(&self) {
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Read the file and publish it if its content changed.
    ///
    /// Empty files and byte-identical content are no-ops. On a decode failure
    /// the stored model, hash and version are all left untouched. On success the
    /// version increases by one, the handler's `on_update` runs, then every
    /// update callback runs in registration order on the calling thread.
    ///
    /// Callbacks must not call `load_file` on the same watcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn load_file(&self) -> Result<LoadOutcome> {
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let result = self.reload();

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_reload(&self.key, started.elapsed(), &result);
        }

        result
    }

    fn reload(&self) -> Result<LoadOutcome> {
        let _serialized = self.reload_lock.lock();

        let data = std::fs::read(&self.path)?;
        if data.is_empty() {
            return Ok(LoadOutcome::Empty);
        }

        let hash = content_hash(&data);
        if self.state.read().content_hash == Some(hash) {
            return Ok(LoadOutcome::Unchanged);
        }

        self.handler
            .decode(&data)
            .map_err(|e| FrameError::ConfigDecode {
                key: self.key.clone(),
                reason: e.to_string(),
            })?;

        let version = {
            let mut state = self.state.write();
            state.content_hash = Some(hash);
            state.version += 1;
            state.update_timestamp = Some(Utc::now());
            state.version
        };

        info!(
            key = %self.key,
            path = %self.path.display(),
            version,
            "updated configuration"
        );
        if self.enable_watch_log {
            debug!(
                key = %self.key,
                version,
                content = %String::from_utf8_lossy(&data),
                "configuration content"
            );
        }

        self.handler.on_update();
        self.callbacks.dispatch(CallbackType::Update);

        Ok(LoadOutcome::Updated { version })
    }

    /// Apply one filesystem event.
    ///
    /// - `Create`: runs the create callbacks if any are registered and skips the
    ///   reload; with no create callbacks the event reloads like a write. The
    ///   presence of create callbacks therefore decides whether a recreated file
    ///   is re-read.
    /// - `Remove`: runs the remove callbacks, never reloads.
    /// - `Rename`: ignored.
    /// - anything else: reloads.
    pub fn handle_event(&self, event: &FsEvent) -> EventDisposition {
        match event.op {
            FsOp::Rename => return EventDisposition::Ignored,
            FsOp::Remove => {
                return EventDisposition::Callbacks(self.callbacks.dispatch(CallbackType::Remove));
            }
            FsOp::Create if self.callbacks.count(CallbackType::Create) > 0 => {
                return EventDisposition::Callbacks(self.callbacks.dispatch(CallbackType::Create));
            }
            FsOp::Create | FsOp::Write | FsOp::Chmod => {}
        }

        match self.load_file() {
            Ok(outcome) => EventDisposition::Reloaded(outcome),
            Err(e) => {
                warn!(
                    key = %self.key,
                    path = %self.path.display(),
                    op = %event.op,
                    error = %e,
                    "failed to reload configuration"
                );
                EventDisposition::ReloadFailed
            }
        }
    }

    async fn retry_watch(self: Arc<Self>) {
        info!(
            key = %self.key,
            interval_secs = self.retry_watch_interval.as_secs_f64(),
            "configuration not watched, retrying periodically"
        );

        let mut retry_total: u64 = 0;
        loop {
            tokio::time::sleep(self.retry_watch_interval).await;
            if self.dir_watcher.is_closed() {
                break;
            }

            retry_total += 1;
            match self.dir_watcher.add_watch(&self.dir) {
                Ok(()) => {
                    self.state.write().watched = true;
                    info!(
                        key = %self.key,
                        dir = %self.dir.display(),
                        retry_total,
                        "watched configuration directory"
                    );
                    if let Err(e) = self.load_file() {
                        warn!(key = %self.key, error = %e, "failed to load configuration");
                    }
                    break;
                }
                Err(e) if self.enable_watch_log => {
                    warn!(
                        key = %self.key,
                        dir = %self.dir.display(),
                        retry_total,
                        error = %e,
                        "failed to watch configuration directory"
                    );
                }
                Err(_) => {}
            }
        }

        self.watched_signal.notify_one();
    }

    async fn run(self: Arc<Self>, mut streams: WatchStreams) {
        while !self.is_watched() {
            if self.dir_watcher.is_closed() {
                info!(key = %self.key, "configuration watcher closed before being watched");
                return;
            }
            self.watched_signal.notified().await;
        }

        loop {
            tokio::select! {
                fault = streams.errors.recv() => match fault {
                    Some(fault) => {
                        warn!(key = %self.key, error = %fault, "configuration watch error");
                    }
                    None => break,
                },
                event = streams.events.recv() => match event {
                    Some(event) => {
                        self.handle_event(&event);
                    }
                    None => break,
                },
            }
        }

        info!(
            key = %self.key,
            path = %self.path.display(),
            "configuration watch loop quit"
        );
    }

    /// Register a callback for `cb_type` events.
    pub fn register_callback<F>(&self, cb_type: CallbackType, callback: F) -> CallbackId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.subscribe(cb_type, callback)
    }

    /// Remove a previously registered callback.
    pub fn unregister_callback(&self, id: CallbackId) -> bool {
        self.callbacks.unsubscribe(id)
    }

    /// The configuration key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Full path of the watched file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The watched directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file name within the watched directory.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Number of content-distinct successful reloads.
    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    /// When the version last changed.
    pub fn update_timestamp(&self) -> Option<DateTime<Utc>> {
        self.state.read().update_timestamp
    }

    /// Whether the directory watch is established.
    pub fn is_watched(&self) -> bool {
        self.state.read().watched
    }

    /// The handler decoding this key's payload.
    pub fn handler(&self) -> &Arc<dyn ConfigHandler> {
        &self.handler
    }

    /// The handler as a [`TypedConfig<T>`], if that is its concrete type.
    pub fn typed<T>(&self) -> Option<TypedConfig<T>>
    where
        T: DeserializeOwned + Serialize + Send + Sync + 'static,
    {
        self.handler
            .as_any()
            .downcast_ref::<TypedConfig<T>>()
            .cloned()
    }

    /// Snapshot of the watcher's runtime state.
    pub fn info(&self) -> ConfigWatcherInfo {
        let (version, update_timestamp, watched, hash) = {
            let state = self.state.read();
            (
                state.version,
                state.update_timestamp,
                state.watched,
                state.content_hash,
            )
        };

        let config_data = match self.handler.serialize() {
            Ok(data) => String::from_utf8_lossy(&data).into_owned(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to serialize configuration");
                String::new()
            }
        };

        ConfigWatcherInfo {
            key: self.key.clone(),
            path: self.path.clone(),
            dir: self.dir.clone(),
            file_name: self.file_name.clone(),
            version,
            update_timestamp,
            watched,
            content_hash: hash.map(hex::encode),
            config_data,
        }
    }
}

fn content_hash(data: &[u8]) -> ContentHash {
    let digest = Sha256::digest(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::memory::MemoryWatcherFactory;
    use serde::Deserialize;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Routes {
        addr: String,
    }

    fn registration(routes: &TypedConfig<Routes>) -> ConfigRegistration {
        ConfigRegistration::new("routes", routes.clone()).with_suffix("json")
    }

    fn counter_callback(counter: &Arc<AtomicUsize>) -> impl Fn() + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_initial_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("routes.json");
        fs::write(&path, r#"{"addr":"a"}"#).unwrap();

        let routes = TypedConfig::<Routes>::json();
        let factory = MemoryWatcherFactory::new();
        let watcher =
            ConfigWatcher::initialize("routes", &path, &registration(&routes), &factory).unwrap();

        assert!(watcher.is_watched());
        assert_eq!(watcher.version(), 1);
        assert!(watcher.update_timestamp().is_some());
        assert_eq!(routes.get().unwrap().addr, "a");
        assert_eq!(watcher.file_name(), "routes.json");
        assert_eq!(watcher.dir(), temp_dir.path());
    }

    #[tokio::test]
    async fn test_identical_content_is_deduplicated() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("routes.json");
        fs::write(&path, r#"{"addr":"a"}"#).unwrap();

        let routes = TypedConfig::<Routes>::json();
        let watcher = ConfigWatcher::initialize(
            "routes",
            &path,
            &registration(&routes),
            &MemoryWatcherFactory::new(),
        )
        .unwrap();
        let updates = Arc::new(AtomicUsize::new(0));
        watcher.register_callback(CallbackType::Update, counter_callback(&updates));

        fs::write(&path, r#"{"addr":"b"}"#).unwrap();
        assert_eq!(
            watcher.load_file().unwrap(),
            LoadOutcome::Updated { version: 2 }
        );
        assert_eq!(watcher.load_file().unwrap(), LoadOutcome::Unchanged);
        assert_eq!(watcher.version(), 2);
        assert_eq!(updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_decode_failure_retains_model_and_version() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("routes.json");
        fs::write(&path, r#"{"addr":"a"}"#).unwrap();

        let routes = TypedConfig::<Routes>::json();
        let watcher = ConfigWatcher::initialize(
            "routes",
            &path,
            &registration(&routes),
            &MemoryWatcherFactory::new(),
        )
        .unwrap();
        let hash_before = watcher.info().content_hash;

        fs::write(&path, r#"{"addr":"#).unwrap();
        let err = watcher.load_file().unwrap_err();
        assert!(matches!(err, FrameError::ConfigDecode { ref key, .. } if key == "routes"));
        assert_eq!(watcher.version(), 1);
        assert_eq!(routes.get().unwrap().addr, "a");
        assert_eq!(watcher.info().content_hash, hash_before);

        // Restoring the original bytes is still a no-op
        fs::write(&path, r#"{"addr":"a"}"#).unwrap();
        assert_eq!(watcher.load_file().unwrap(), LoadOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_empty_file_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("routes.json");
        fs::write(&path, "").unwrap();

        let routes = TypedConfig::<Routes>::json();
        let watcher = ConfigWatcher::initialize(
            "routes",
            &path,
            &registration(&routes),
            &MemoryWatcherFactory::new(),
        )
        .unwrap();

        assert_eq!(watcher.load_file().unwrap(), LoadOutcome::Empty);
        assert_eq!(watcher.version(), 0);
        assert!(!routes.is_loaded());
    }

    #[tokio::test]
    async fn test_must_load_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("routes.json");

        let routes = TypedConfig::<Routes>::json();
        let result = ConfigWatcher::initialize(
            "routes",
            &path,
            &registration(&routes).with_must_load(true),
            &MemoryWatcherFactory::new(),
        );
        assert!(matches!(result, Err(FrameError::ConfigWatchSetup { .. })));
    }

    #[tokio::test]
    async fn test_must_load_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("routes.json");

        let routes = TypedConfig::<Routes>::json();
        let result = ConfigWatcher::initialize(
            "routes",
            &path,
            &registration(&routes).with_must_load(true),
            &MemoryWatcherFactory::new(),
        );
        assert!(matches!(result, Err(FrameError::ConfigWatchSetup { .. })));
    }

    #[tokio::test]
    async fn test_missing_file_without_must_load_is_tolerated() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("routes.json");

        let routes = TypedConfig::<Routes>::json();
        let watcher = ConfigWatcher::initialize(
            "routes",
            &path,
            &registration(&routes),
            &MemoryWatcherFactory::new(),
        )
        .unwrap();
        assert!(watcher.is_watched());
        assert_eq!(watcher.version(), 0);
    }

    #[tokio::test]
    async fn test_event_classification() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("routes.json");
        fs::write(&path, r#"{"addr":"a"}"#).unwrap();

        let routes = TypedConfig::<Routes>::json();
        let watcher = ConfigWatcher::initialize(
            "routes",
            &path,
            &registration(&routes),
            &MemoryWatcherFactory::new(),
        )
        .unwrap();
        let removes = Arc::new(AtomicUsize::new(0));
        watcher.register_callback(CallbackType::Remove, counter_callback(&removes));

        fs::write(&path, r#"{"addr":"b"}"#).unwrap();
        assert_eq!(
            watcher.handle_event(&FsEvent::new(&path, FsOp::Rename)),
            EventDisposition::Ignored
        );
        assert_eq!(
            watcher.handle_event(&FsEvent::new(&path, FsOp::Remove)),
            EventDisposition::Callbacks(1)
        );
        assert_eq!(watcher.version(), 1);
        assert_eq!(removes.load(Ordering::SeqCst), 1);

        // No create callbacks: a create event reloads
        assert_eq!(
            watcher.handle_event(&FsEvent::new(&path, FsOp::Create)),
            EventDisposition::Reloaded(LoadOutcome::Updated { version: 2 })
        );

        fs::write(&path, r#"{"addr":"#).unwrap();
        assert_eq!(
            watcher.handle_event(&FsEvent::new(&path, FsOp::Write)),
            EventDisposition::ReloadFailed
        );
        assert_eq!(routes.get().unwrap().addr, "b");
    }

    #[tokio::test]
    async fn test_create_callbacks_suppress_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("routes.json");
        fs::write(&path, r#"{"addr":"a"}"#).unwrap();

        let routes = TypedConfig::<Routes>::json();
        let watcher = ConfigWatcher::initialize(
            "routes",
            &path,
            &registration(&routes),
            &MemoryWatcherFactory::new(),
        )
        .unwrap();
        let creates = Arc::new(AtomicUsize::new(0));
        watcher.register_callback(CallbackType::Create, counter_callback(&creates));

        fs::write(&path, r#"{"addr":"b"}"#).unwrap();
        assert_eq!(
            watcher.handle_event(&FsEvent::new(&path, FsOp::Create)),
            EventDisposition::Callbacks(1)
        );
        assert_eq!(watcher.version(), 1);
        assert_eq!(routes.get().unwrap().addr, "a");
        assert_eq!(creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_active_loop_reloads_and_quits_on_close() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("routes.json");
        fs::write(&path, r#"{"addr":"a"}"#).unwrap();

        let routes = TypedConfig::<Routes>::json();
        let factory = MemoryWatcherFactory::new();
        let watcher =
            ConfigWatcher::initialize("routes", &path, &registration(&routes), &factory).unwrap();
        let (updated_tx, mut updated_rx) = tokio::sync::mpsc::unbounded_channel();
        watcher.register_callback(CallbackType::Update, move || {
            let _ = updated_tx.send(());
        });
        watcher.start().unwrap();
        assert!(watcher.start().is_err());

        fs::write(&path, r#"{"addr":"b"}"#).unwrap();
        let fake = factory.last().unwrap();
        fake.emit_error("transient");
        fake.emit(&path, FsOp::Write);

        timeout(Duration::from_secs(2), updated_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(watcher.version(), 2);
        assert_eq!(routes.get().unwrap().addr, "b");

        watcher.stop().unwrap();
        timeout(Duration::from_secs(2), watcher.closed())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_directory_exists() {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().join("conf");
        let path = config_dir.join("routes.json");

        let routes = TypedConfig::<Routes>::json();
        let reg = registration(&routes).with_retry_watch_interval(Duration::from_secs(5));
        let watcher =
            ConfigWatcher::initialize("routes", &path, &reg, &MemoryWatcherFactory::new())
                .unwrap();
        watcher.start().unwrap();
        assert!(!watcher.is_watched());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!watcher.is_watched());

        fs::create_dir_all(&config_dir).unwrap();
        fs::write(&path, r#"{"addr":"late"}"#).unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(watcher.is_watched());
        assert_eq!(watcher.version(), 1);
        assert_eq!(routes.get().unwrap().addr, "late");

        watcher.stop().unwrap();
        watcher.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_retry_loop() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("never").join("routes.json");

        let routes = TypedConfig::<Routes>::json();
        let watcher = ConfigWatcher::initialize(
            "routes",
            &path,
            &registration(&routes),
            &MemoryWatcherFactory::new(),
        )
        .unwrap();
        watcher.start().unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        watcher.stop().unwrap();
        watcher.closed().await;
        assert!(!watcher.is_watched());
    }

    #[tokio::test]
    async fn test_info_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("routes.json");
        fs::write(&path, r#"{"addr":"a"}"#).unwrap();

        let routes = TypedConfig::<Routes>::json();
        let watcher = ConfigWatcher::initialize(
            "routes",
            &path,
            &registration(&routes),
            &MemoryWatcherFactory::new(),
        )
        .unwrap();

        let info = watcher.info();
        assert_eq!(info.key, "routes");
        assert_eq!(info.version, 1);
        assert!(info.watched);
        assert_eq!(info.content_hash.unwrap().len(), 64);
        assert_eq!(info.config_data, r#"{"addr":"a"}"#);
        assert!(watcher.typed::<Routes>().is_some());
    }
}
