//! Root composition context.

use crate::core::component::{Component, ComponentPriority, KeywordModel};
use crate::core::registry::ComponentRegistry;
use crate::watch::{ConfigRegistration, ConfigRegistry, DirectoryWatcherFactory};
use std::sync::Arc;

#[cfg(feature = "metrics")]
use crate::metrics::WatcherMetrics;

/// Everything registered before launch: component types, configuration keys
/// and the directory watch facility.
///
/// Built once at process start with [`FrameContext::builder`] and passed by
/// reference into the launcher. Nothing here is global.
pub struct FrameContext {
    pub(crate) components: ComponentRegistry,
    pub(crate) configs: ConfigRegistry,
    pub(crate) watcher_factory: Arc<dyn DirectoryWatcherFactory>,
    #[cfg(feature = "metrics")]
    pub(crate) metrics: Option<WatcherMetrics>,
}

impl FrameContext {
    /// Start building a context.
    pub fn builder() -> FrameContextBuilder {
        FrameContextBuilder::new()
    }

    /// Registered component types.
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Registered configuration keys.
    pub fn configs(&self) -> &ConfigRegistry {
        &self.configs
    }

    /// Directory watch facility used for every configuration key.
    pub fn watcher_factory(&self) -> &dyn DirectoryWatcherFactory {
        self.watcher_factory.as_ref()
    }
}

/// Builder for [`FrameContext`].
///
/// # Examples
///
/// ```rust
/// use hotswap_daemon::prelude::*;
///
/// let routes = TypedConfig::<serde_json::Value>::json();
/// let context = FrameContext::builder()
///     .register_config(ConfigRegistration::new("routes", routes).with_suffix("json"))
///     .with_watcher_factory(MemoryWatcherFactory::new())
///     .build();
///
/// assert!(context.configs().get("routes").is_some());
/// ```
pub struct FrameContextBuilder {
    components: ComponentRegistry,
    configs: ConfigRegistry,
    watcher_factory: Option<Arc<dyn DirectoryWatcherFactory>>,
    #[cfg(feature = "metrics")]
    metrics: Option<WatcherMetrics>,
}

impl FrameContextBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            components: ComponentRegistry::new(),
            configs: ConfigRegistry::new(),
            watcher_factory: None,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Register a component type with keyword model `K`.
    ///
    /// Registering the same type name again replaces the earlier registration.
    pub fn register_component<K, F>(
        mut self,
        priority: ComponentPriority,
        type_name: &str,
        new_component: F,
    ) -> Self
    where
        K: KeywordModel,
        F: Fn() -> Box<dyn Component> + Send + Sync + 'static,
    {
        self.components.register::<K, F>(priority, type_name, new_component);
        self
    }

    /// Register a configuration key.
    pub fn register_config(mut self, registration: ConfigRegistration) -> Self {
        self.configs.register(registration);
        self
    }

    /// Use a specific directory watch facility.
    ///
    /// Defaults to the OS notification backend when the `file-watch` feature is
    /// enabled, and to the in-memory watcher otherwise.
    pub fn with_watcher_factory<W>(mut self, factory: W) -> Self
    where
        W: DirectoryWatcherFactory + 'static,
    {
        self.watcher_factory = Some(Arc::new(factory));
        self
    }

    /// Record reload metrics for every configuration key.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: WatcherMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Finish building.
    pub fn build(self) -> FrameContext {
        FrameContext {
            components: self.components,
            configs: self.configs,
            watcher_factory: self.watcher_factory.unwrap_or_else(default_watcher_factory),
            #[cfg(feature = "metrics")]
            metrics: self.metrics,
        }
    }
}

impl Default for FrameContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "file-watch")]
fn default_watcher_factory() -> Arc<dyn DirectoryWatcherFactory> {
    Arc::new(crate::watch::NotifyWatcherFactory)
}

#[cfg(not(feature = "file-watch"))]
fn default_watcher_factory() -> Arc<dyn DirectoryWatcherFactory> {
    Arc::new(crate::watch::MemoryWatcherFactory::new())
}
