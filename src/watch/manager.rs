//! Group ownership of every configuration watcher in a process.

use crate::error::{FrameError, Result};
use crate::launch::ConfigDescriptor;
use crate::watch::callbacks::{CallbackId, CallbackType};
use crate::watch::config_watcher::{ConfigWatcher, ConfigWatcherInfo};
use crate::watch::directory::DirectoryWatcherFactory;
use crate::watch::handler::TypedConfig;
use crate::watch::registration::{ConfigRegistration, ConfigRegistry};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[cfg(feature = "metrics")]
use crate::metrics::WatcherMetrics;

/// Directory, relative to the work dir, holding template configs in dev mode.
pub const TEMPLATE_DIR: &str = "configs/template";

/// Owns the [`ConfigWatcher`] of every configured key.
#[derive(Default)]
pub struct ConfigWatcherManager {
    watchers: BTreeMap<String, Arc<ConfigWatcher>>,
}

impl ConfigWatcherManager {
    /// A manager without watchers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build one watcher per descriptor whose key is registered.
    ///
    /// Unregistered and duplicate keys are skipped with a warning. In dev mode the
    /// descriptor's path is replaced by `<work_dir>/configs/template/<key>.<suffix>`.
    ///
    /// # Errors
    ///
    /// Fails on the first watcher that cannot be initialized, which only happens
    /// for must-load keys or when no watch facility is available.
    pub fn initialize(
        registry: &ConfigRegistry,
        factory: &dyn DirectoryWatcherFactory,
        work_dir: &Path,
        descriptors: &[ConfigDescriptor],
        dev_mode: bool,
    ) -> Result<Self> {
        Self::build(
            registry,
            factory,
            work_dir,
            descriptors,
            dev_mode,
            #[cfg(feature = "metrics")]
            None,
        )
    }

    /// Like [`initialize`](Self::initialize), recording reload metrics for every key.
    #[cfg(feature = "metrics")]
    pub fn initialize_with_metrics(
        registry: &ConfigRegistry,
        factory: &dyn DirectoryWatcherFactory,
        work_dir: &Path,
        descriptors: &[ConfigDescriptor],
        dev_mode: bool,
        metrics: WatcherMetrics,
    ) -> Result<Self> {
        Self::build(registry, factory, work_dir, descriptors, dev_mode, Some(metrics))
    }

    fn build(
        registry: &ConfigRegistry,
        factory: &dyn DirectoryWatcherFactory,
        work_dir: &Path,
        descriptors: &[ConfigDescriptor],
        dev_mode: bool,
        #[cfg(feature = "metrics")] metrics: Option<WatcherMetrics>,
    ) -> Result<Self> {
        let mut watchers = BTreeMap::new();

        for descriptor in descriptors {
            let Some(registration) = registry.get(&descriptor.key) else {
                warn!(key = %descriptor.key, "configuration key is not registered, skipping");
                continue;
            };
            if watchers.contains_key(&descriptor.key) {
                warn!(key = %descriptor.key, "configuration key declared twice, skipping");
                continue;
            }

            let registration = apply_overrides(registration, descriptor);
            let path = resolve_path(work_dir, &registration, descriptor, dev_mode);

            #[cfg(feature = "metrics")]
            let result = match &metrics {
                Some(metrics) => ConfigWatcher::initialize_with_metrics(
                    descriptor.key.as_str(),
                    &path,
                    &registration,
                    factory,
                    metrics.clone(),
                ),
                None => ConfigWatcher::initialize(
                    descriptor.key.as_str(),
                    &path,
                    &registration,
                    factory,
                ),
            };
            #[cfg(not(feature = "metrics"))]
            let result =
                ConfigWatcher::initialize(descriptor.key.as_str(), &path, &registration, factory);

            match result {
                Ok(watcher) => {
                    watchers.insert(descriptor.key.clone(), watcher);
                }
                Err(e) => {
                    // Watchers built so far may own retry loops
                    Self { watchers }.stop();
                    return Err(e);
                }
            }
        }

        info!(count = watchers.len(), dev_mode, "initialized configuration watchers");
        Ok(Self { watchers })
    }

    /// Start every watcher's loop. Returns the number that failed to start.
    pub fn start(&self) -> usize {
        self.fan_out("start", |watcher| watcher.start())
    }

    /// Stop every watcher. Returns the number that failed to stop.
    pub fn stop(&self) -> usize {
        self.fan_out("stop", |watcher| watcher.stop())
    }

    fn fan_out<F>(&self, action: &'static str, f: F) -> usize
    where
        F: Fn(&Arc<ConfigWatcher>) -> Result<()>,
    {
        let mut failures = 0;
        for (key, watcher) in &self.watchers {
            if let Err(e) = f(watcher) {
                warn!(key = %key, action, error = %e, "configuration watcher failed");
                failures += 1;
            }
        }
        failures
    }

    /// Wait until every watcher's background tasks have finished.
    pub async fn closed(&self) {
        for watcher in self.watchers.values() {
            watcher.closed().await;
        }
    }

    /// Register a callback against the watcher for `key`.
    ///
    /// # Arguments
    ///
    /// * `key` - A key declared in the launch descriptor and registered up front
    /// * `cb_type` - Which file event the callback follows
    /// * `callback` - Runs on the key's watcher task, after the model is replaced
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use hotswap_daemon::launch::ConfigDescriptor;
    /// use hotswap_daemon::watch::{
    ///     CallbackType, ConfigRegistration, ConfigRegistry, ConfigWatcherManager,
    ///     MemoryWatcherFactory, TypedConfig,
    /// };
    /// use std::path::Path;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> hotswap_daemon::error::Result<()> {
    /// let mut registry = ConfigRegistry::new();
    /// registry.register(ConfigRegistration::new("routes", TypedConfig::<serde_json::Value>::json()));
    ///
    /// let descriptors = vec![ConfigDescriptor {
    ///     key: "routes".to_string(),
    ///     path: "/etc/echo/routes.json".to_string(),
    ///     ..ConfigDescriptor::default()
    /// }];
    /// let manager = ConfigWatcherManager::initialize(
    ///     &registry,
    ///     &MemoryWatcherFactory::new(),
    ///     Path::new("."),
    ///     &descriptors,
    ///     false,
    /// )?;
    ///
    /// manager.register_callback("routes", CallbackType::Update, || {
    ///     tracing::info!("routes reloaded");
    /// })?;
    /// assert!(manager.register_callback("limits", CallbackType::Update, || {}).is_err());
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::ConfigNotRegistered`] if no watcher exists for `key`.
    pub fn register_callback<F>(
        &self,
        key: &str,
        cb_type: CallbackType,
        callback: F,
    ) -> Result<CallbackId>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Ok(self.require(key)?.register_callback(cb_type, callback))
    }

    /// Remove a callback registered against `key`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::ConfigNotRegistered`] if no watcher exists for `key`.
    pub fn unregister_callback(&self, key: &str, id: CallbackId) -> Result<bool> {
        Ok(self.require(key)?.unregister_callback(id))
    }

    fn require(&self, key: &str) -> Result<&Arc<ConfigWatcher>> {
        self.watchers
            .get(key)
            .ok_or_else(|| FrameError::ConfigNotRegistered(key.to_string()))
    }

    /// The watcher for `key`.
    pub fn watcher(&self, key: &str) -> Option<&Arc<ConfigWatcher>> {
        self.watchers.get(key)
    }

    /// The typed handler for `key`, if it is a [`TypedConfig<T>`].
    pub fn typed<T>(&self, key: &str) -> Option<TypedConfig<T>>
    where
        T: DeserializeOwned + Serialize + Send + Sync + 'static,
    {
        self.watchers.get(key).and_then(|w| w.typed::<T>())
    }

    /// Keys with a watcher, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.watchers.keys().map(String::as_str)
    }

    /// Snapshot of every watcher, sorted by key.
    pub fn infos(&self) -> Vec<ConfigWatcherInfo> {
        self.watchers.values().map(|w| w.info()).collect()
    }

    /// Number of watchers.
    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    /// Whether there are no watchers.
    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }
}

fn apply_overrides(registration: &ConfigRegistration, descriptor: &ConfigDescriptor) -> ConfigRegistration {
    let mut registration = registration.clone();
    if descriptor.enable_watch_log {
        registration = registration.with_watch_log(true);
    }
    if descriptor.retry_watch_interval_sec > 0 {
        registration = registration
            .with_retry_watch_interval(Duration::from_secs(descriptor.retry_watch_interval_sec));
    }
    registration
}

/// Effective path of a key's file.
pub fn resolve_path(
    work_dir: &Path,
    registration: &ConfigRegistration,
    descriptor: &ConfigDescriptor,
    dev_mode: bool,
) -> PathBuf {
    if dev_mode {
        work_dir.join(TEMPLATE_DIR).join(registration.file_name())
    } else {
        PathBuf::from(&descriptor.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::memory::MemoryWatcherFactory;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    type Raw = serde_json::Value;

    fn descriptor(key: &str, path: &Path) -> ConfigDescriptor {
        ConfigDescriptor {
            key: key.to_string(),
            path: path.to_string_lossy().into_owned(),
            ..ConfigDescriptor::default()
        }
    }

    #[tokio::test]
    async fn test_unregistered_keys_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("routes.json");
        fs::write(&path, r#"{"a":1}"#).unwrap();

        let mut registry = ConfigRegistry::new();
        registry.register(ConfigRegistration::new("routes", TypedConfig::<Raw>::json()));

        let manager = ConfigWatcherManager::initialize(
            &registry,
            &MemoryWatcherFactory::new(),
            temp_dir.path(),
            &[
                descriptor("routes", &path),
                descriptor("unknown", &path),
                descriptor("routes", &path),
            ],
            false,
        )
        .unwrap();

        assert_eq!(manager.len(), 1);
        assert_eq!(manager.keys().collect::<Vec<_>>(), vec!["routes"]);
        assert_eq!(manager.typed::<Raw>("routes").unwrap().get().unwrap()["a"], 1);
    }

    #[tokio::test]
    async fn test_dev_mode_uses_template_layout() {
        let temp_dir = TempDir::new().unwrap();
        let template_dir = temp_dir.path().join(TEMPLATE_DIR);
        fs::create_dir_all(&template_dir).unwrap();
        fs::write(template_dir.join("routes.json"), r#"{"dev":true}"#).unwrap();

        let mut registry = ConfigRegistry::new();
        registry.register(
            ConfigRegistration::new("routes", TypedConfig::<Raw>::json()).with_suffix("json"),
        );

        let manager = ConfigWatcherManager::initialize(
            &registry,
            &MemoryWatcherFactory::new(),
            temp_dir.path(),
            &[descriptor("routes", Path::new("/nonexistent/routes.json"))],
            true,
        )
        .unwrap();

        let watcher = manager.watcher("routes").unwrap();
        assert_eq!(watcher.path(), template_dir.join("routes.json"));
        assert_eq!(watcher.version(), 1);
    }

    #[test]
    fn test_descriptor_overrides() {
        let registration = ConfigRegistration::new("routes", TypedConfig::<Raw>::json());
        let mut desc = descriptor("routes", Path::new("routes.json"));

        let unchanged = apply_overrides(&registration, &desc);
        assert!(!unchanged.watch_log_enabled());
        assert_eq!(unchanged.retry_watch_interval(), registration.retry_watch_interval());

        desc.enable_watch_log = true;
        desc.retry_watch_interval_sec = 7;
        let overridden = apply_overrides(&registration, &desc);
        assert!(overridden.watch_log_enabled());
        assert_eq!(overridden.retry_watch_interval(), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_must_load_failure_aborts() {
        let temp_dir = TempDir::new().unwrap();
        let mut registry = ConfigRegistry::new();
        registry.register(
            ConfigRegistration::new("routes", TypedConfig::<Raw>::json()).with_must_load(true),
        );

        let result = ConfigWatcherManager::initialize(
            &registry,
            &MemoryWatcherFactory::new(),
            temp_dir.path(),
            &[descriptor("routes", &temp_dir.path().join("absent.json"))],
            false,
        );
        assert!(matches!(result, Err(FrameError::ConfigWatchSetup { .. })));
    }

    #[tokio::test]
    async fn test_callback_lookup_and_fan_out() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("routes.json");
        fs::write(&path, r#"{"a":1}"#).unwrap();

        let mut registry = ConfigRegistry::new();
        registry.register(ConfigRegistration::new("routes", TypedConfig::<Raw>::json()));
        let manager = ConfigWatcherManager::initialize(
            &registry,
            &MemoryWatcherFactory::new(),
            temp_dir.path(),
            &[descriptor("routes", &path)],
            false,
        )
        .unwrap();

        let updates = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&updates);
        let id = manager
            .register_callback("routes", CallbackType::Update, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert!(matches!(
            manager.register_callback("missing", CallbackType::Update, || {}),
            Err(FrameError::ConfigNotRegistered(_))
        ));

        fs::write(&path, r#"{"a":2}"#).unwrap();
        manager.watcher("routes").unwrap().load_file().unwrap();
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert!(manager.unregister_callback("routes", id).unwrap());

        assert_eq!(manager.start(), 0);
        assert_eq!(manager.start(), 1);
        assert_eq!(manager.stop(), 0);
        manager.closed().await;

        let infos = manager.infos();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].version, 2);
    }
}
