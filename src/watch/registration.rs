//! Static registration metadata for configuration keys.

use crate::watch::handler::{ConfigFormat, ConfigHandler};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Interval between watch attempts when a key has not been watched yet.
pub const DEFAULT_RETRY_WATCH_INTERVAL: Duration = Duration::from_secs(2);

type NewHandlerFn = Arc<dyn Fn() -> Arc<dyn ConfigHandler> + Send + Sync>;

/// Everything the framework needs to know about one configuration key.
///
/// # Examples
///
/// ```rust
/// use hotswap_daemon::watch::{ConfigRegistration, TypedConfig};
/// use std::time::Duration;
///
/// #[derive(Default, serde::Serialize, serde::Deserialize)]
/// struct Routes {
///     addr: String,
/// }
///
/// let routes = TypedConfig::<Routes>::json();
/// let registration = ConfigRegistration::new("routes", routes.clone())
///     .with_suffix("json")
///     .with_retry_watch_interval(Duration::from_secs(5));
///
/// assert_eq!(registration.file_name(), "routes.json");
/// assert!(!registration.must_load());
/// ```
#[derive(Clone)]
pub struct ConfigRegistration {
    key: String,
    suffix: String,
    new_handler: NewHandlerFn,
    must_load: bool,
    enable_watch_log: bool,
    retry_watch_interval: Duration,
}

impl ConfigRegistration {
    /// Register `key` with a handler that is shared by every watcher built for it.
    pub fn new<H>(key: impl Into<String>, handler: H) -> Self
    where
        H: ConfigHandler + Clone,
    {
        Self::with_factory(key, move || Arc::new(handler.clone()) as Arc<dyn ConfigHandler>)
    }

    /// Register `key` with a function producing its handler.
    pub fn with_factory<F>(key: impl Into<String>, new_handler: F) -> Self
    where
        F: Fn() -> Arc<dyn ConfigHandler> + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            suffix: String::new(),
            new_handler: Arc::new(new_handler),
            must_load: false,
            enable_watch_log: false,
            retry_watch_interval: DEFAULT_RETRY_WATCH_INTERVAL,
        }
    }

    /// File suffix used when the path is derived from the template layout.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Make a missing or unwatchable file a fatal launch error.
    pub fn with_must_load(mut self, must_load: bool) -> Self {
        self.must_load = must_load;
        self
    }

    /// Log watch retries and dump reloaded content.
    pub fn with_watch_log(mut self, enable: bool) -> Self {
        self.enable_watch_log = enable;
        self
    }

    /// Set the watch retry interval. A zero interval selects the default.
    pub fn with_retry_watch_interval(mut self, interval: Duration) -> Self {
        self.retry_watch_interval = if interval.is_zero() {
            DEFAULT_RETRY_WATCH_INTERVAL
        } else {
            interval
        };
        self
    }

    /// The configuration key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The file suffix, possibly empty.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// `<key>.<suffix>`, or just `<key>` without a suffix.
    pub fn file_name(&self) -> String {
        if self.suffix.is_empty() {
            self.key.clone()
        } else {
            format!("{}.{}", self.key, self.suffix)
        }
    }

    /// Whether the suffix names a payload format other than the one `handler` decodes.
    ///
    /// Suffixes that name no payload format, and handlers without a fixed
    /// format, never conflict.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hotswap_daemon::watch::{ConfigRegistration, TypedConfig};
    ///
    /// let routes = TypedConfig::<serde_json::Value>::json();
    /// let registration = ConfigRegistration::new("routes", routes.clone());
    ///
    /// assert!(!registration.clone().with_suffix("json").suffix_conflicts(&routes));
    /// assert!(!registration.clone().with_suffix("conf").suffix_conflicts(&routes));
    /// assert!(registration.with_suffix("yaml").suffix_conflicts(&routes));
    /// ```
    pub fn suffix_conflicts(&self, handler: &dyn ConfigHandler) -> bool {
        match handler.payload_format() {
            Some(expected) => {
                ConfigFormat::is_data_suffix(&self.suffix)
                    && ConfigFormat::from_suffix(&self.suffix) != Some(expected)
            }
            None => false,
        }
    }

    /// Whether the key must load at setup.
    pub fn must_load(&self) -> bool {
        self.must_load
    }

    /// Whether verbose watch logging is enabled.
    pub fn watch_log_enabled(&self) -> bool {
        self.enable_watch_log
    }

    /// Interval between watch attempts.
    pub fn retry_watch_interval(&self) -> Duration {
        self.retry_watch_interval
    }

    /// Produce the handler for a new watcher.
    pub fn new_handler(&self) -> Arc<dyn ConfigHandler> {
        (self.new_handler)()
    }
}

impl fmt::Debug for ConfigRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigRegistration")
            .field("key", &self.key)
            .field("suffix", &self.suffix)
            .field("must_load", &self.must_load)
            .field("enable_watch_log", &self.enable_watch_log)
            .field("retry_watch_interval", &self.retry_watch_interval)
            .finish_non_exhaustive()
    }
}

/// Key-indexed table of [`ConfigRegistration`]s.
///
/// Registering a key twice replaces the earlier registration.
#[derive(Debug, Clone, Default)]
pub struct ConfigRegistry {
    registrations: HashMap<String, ConfigRegistration>,
}

impl ConfigRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a registration.
    pub fn register(&mut self, registration: ConfigRegistration) {
        self.registrations
            .insert(registration.key.clone(), registration);
    }

    /// Look up a registration by key.
    pub fn get(&self, key: &str) -> Option<&ConfigRegistration> {
        self.registrations.get(key)
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether no keys are registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
