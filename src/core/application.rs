//! The application orchestrator: import, start, wait, stop.

use crate::core::component::{Component, ComponentId, ComponentStatus, ComponentType, InitContext};
use crate::core::registry::ComponentRegistry;
use crate::core::signals::{Shutdown, ShutdownReason, install_signal_handlers};
use crate::error::{FrameError, Result};
use crate::launch::ComponentDeclaration;
use crate::watch::ConfigWatcherManager;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::fmt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Identity of an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ApplicationId(String);

impl ApplicationId {
    /// Create an application id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the process is the primary one or a re-exec'd child.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ProcessType {
    /// The primary long-lived process.
    #[default]
    Main,
    /// A child sharing the same binary.
    Sub,
}

impl ProcessType {
    /// Numeric code used on the command line of sub-processes.
    pub fn code(self) -> u8 {
        match self {
            Self::Main => 1,
            Self::Sub => 2,
        }
    }

    /// Parse a numeric code. Unknown codes yield `None`.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Main),
            2 => Some(Self::Sub),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Sub => f.write_str("sub"),
        }
    }
}

/// Lifecycle state of an [`Application`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppState {
    /// Freshly constructed.
    Uninitialized,
    /// Identity assigned, signal handlers installed.
    BaseInitialized,
    /// Components imported.
    Initialized,
    /// Components started.
    Running,
    /// Stop sequence in progress.
    Stopping,
    /// Terminal.
    Stopped,
}

impl AppState {
    /// Lowercase name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::BaseInitialized => "base_initialized",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of an imported component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Component id
    pub id: ComponentId,
    /// Registered type
    pub component_type: ComponentType,
    /// 1-based declaration ordinal
    pub index: usize,
    /// Lifecycle status
    pub status: ComponentStatus,
    /// When `start` succeeded
    pub start_timestamp: Option<DateTime<Utc>>,
}

struct ComponentEntry {
    info: ComponentInfo,
    instance: Box<dyn Component>,
}

/// Application-level extension points, all no-ops by default.
#[async_trait]
pub trait AppHooks: Send + Sync {
    /// Runs after configuration watchers are up and before components are imported.
    ///
    /// # Errors
    ///
    /// An error aborts the launch.
    async fn initialize(&self, _configs: &ConfigWatcherManager) -> Result<()> {
        Ok(())
    }

    /// Runs once every component has started.
    ///
    /// # Errors
    ///
    /// An error aborts the launch.
    async fn after_start(&self, _app: &Application) -> Result<()> {
        Ok(())
    }

    /// Runs after shutdown is triggered, before components stop. Errors are logged.
    async fn before_stop(&self, _app: &Application) -> Result<()> {
        Ok(())
    }
}

/// [`AppHooks`] that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl AppHooks for NoHooks {}

/// Owns every component of one process and drives their lifecycle.
///
/// Components start in declaration order and stop in the same order. Import is
/// not transactional: when a declaration fails, the components imported before
/// it stay in the application and are still stopped by [`stop`](Self::stop).
pub struct Application {
    id: ApplicationId,
    process_type: ProcessType,
    state: AppState,
    components: IndexMap<ComponentId, ComponentEntry>,
    shutdown: Shutdown,
    signal_task: Option<JoinHandle<()>>,
}

impl Application {
    /// Create an uninitialized application.
    pub fn new() -> Self {
        Self {
            id: ApplicationId::default(),
            process_type: ProcessType::Main,
            state: AppState::Uninitialized,
            components: IndexMap::new(),
            shutdown: Shutdown::new(),
            signal_task: None,
        }
    }

    fn expect_state(&self, expected: AppState) -> Result<()> {
        if self.state != expected {
            return Err(FrameError::InvalidState {
                expected: expected.as_str(),
                found: self.state.as_str(),
            });
        }
        Ok(())
    }

    /// Assign identity and install handlers for SIGINT, SIGTERM and SIGQUIT.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::SignalHandlerSetup`] if the handlers cannot be installed.
    pub fn base_initialize(&mut self, id: ApplicationId, process_type: ProcessType) -> Result<()> {
        self.expect_state(AppState::Uninitialized)?;

        self.signal_task = Some(install_signal_handlers(&self.shutdown)?);
        self.id = id;
        self.process_type = process_type;
        self.state = AppState::BaseInitialized;

        info!(app_id = %self.id, process_type = %self.process_type, "application base initialized");
        Ok(())
    }

    /// Instantiate and initialize every enabled declaration, in order.
    ///
    /// Each component gets the id `<type>_<index>`, where the index counts
    /// enabled declarations from 1.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use async_trait::async_trait;
    /// use hotswap_daemon::core::{
    ///     Application, ApplicationId, Component, ComponentPriority, ComponentRegistry,
    ///     InitContext, KeywordArgs, NoKeywordArgs, ProcessType,
    /// };
    /// use hotswap_daemon::error::Result;
    /// use hotswap_daemon::launch::ComponentDeclaration;
    /// use hotswap_daemon::watch::ConfigWatcherManager;
    ///
    /// struct Idle;
    ///
    /// #[async_trait]
    /// impl Component for Idle {
    ///     async fn initialize(&mut self, _ctx: &InitContext<'_>, _kw: KeywordArgs) -> Result<()> {
    ///         Ok(())
    ///     }
    ///
    ///     async fn start(&mut self) -> Result<()> {
    ///         Ok(())
    ///     }
    ///
    ///     async fn stop(&mut self) -> Result<()> {
    ///         Ok(())
    ///     }
    /// }
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<()> {
    /// let mut registry = ComponentRegistry::new();
    /// registry.register::<NoKeywordArgs, _>(ComponentPriority::General, "Idle", || Box::new(Idle));
    ///
    /// let mut app = Application::new();
    /// app.base_initialize(ApplicationId::new("idle-daemon"), ProcessType::Main)?;
    /// let declarations = vec![
    ///     ComponentDeclaration::new("Idle").disabled(),
    ///     ComponentDeclaration::new("Idle"),
    /// ];
    /// app.import_components(&registry, &ConfigWatcherManager::empty(), &declarations)
    ///     .await?;
    ///
    /// assert!(app.component("Idle_1").is_some());
    /// app.stop().await;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Stops at the first declaration whose type is unregistered, whose keyword
    /// arguments do not decode, or whose `initialize` fails. Components imported
    /// before it are kept.
    pub async fn import_components(
        &mut self,
        registry: &ComponentRegistry,
        configs: &ConfigWatcherManager,
        declarations: &[ComponentDeclaration],
    ) -> Result<()> {
        self.expect_state(AppState::BaseInitialized)?;

        let enabled = declarations.iter().filter(|decl| !decl.disable);
        for (offset, declaration) in enabled.enumerate() {
            let index = offset + 1;
            let descriptor = registry.resolve(&declaration.component_type)?;
            let component_type = descriptor.component_type().clone();
            let id = ComponentId::derive(&component_type, index);

            let wrap = |source: FrameError| FrameError::ComponentInitialization {
                component_type: component_type.to_string(),
                source: Box::new(source),
            };

            let mut instance = descriptor.new_component();
            let mut status = ComponentStatus::Created;
            debug!(component = %id, %status, "component instantiated");

            let initialized = async {
                let kw = descriptor.decode_keywords(&declaration.kw)?;
                status = ComponentStatus::BaseInitialized;

                let ctx = InitContext {
                    id: &id,
                    component_type: &component_type,
                    app_id: &self.id,
                    process_type: self.process_type,
                    configs,
                };
                instance.initialize(&ctx, kw).await?;
                status = ComponentStatus::Initialized;
                Ok::<(), FrameError>(())
            }
            .await;
            if let Err(source) = initialized {
                error!(component = %id, %status, error = %source, "component import failed");
                return Err(wrap(source));
            }

            info!(component = %id, "component initialized");
            self.components.insert(
                id.clone(),
                ComponentEntry {
                    info: ComponentInfo {
                        id,
                        component_type,
                        index,
                        status,
                        start_timestamp: None,
                    },
                    instance,
                },
            );
        }

        self.state = AppState::Initialized;
        info!(app_id = %self.id, components = self.components.len(), "components imported");
        Ok(())
    }

    /// Start every component in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::ComponentStart`] for the first component that fails;
    /// the remaining components are not started and nothing is rolled back.
    pub async fn start(&mut self) -> Result<()> {
        self.expect_state(AppState::Initialized)?;

        for entry in self.components.values_mut() {
            entry
                .instance
                .start()
                .await
                .map_err(|source| FrameError::ComponentStart {
                    id: entry.info.id.to_string(),
                    source: Box::new(source),
                })?;
            entry.info.status = ComponentStatus::Started;
            entry.info.start_timestamp = Some(Utc::now());
            info!(component = %entry.info.id, "component started");
        }

        self.state = AppState::Running;
        Ok(())
    }

    /// Block until a termination signal arrives or shutdown is requested.
    pub async fn forever(&self) -> ShutdownReason {
        let reason = self.shutdown.wait().await;
        info!(app_id = %self.id, %reason, "application shutting down");
        reason
    }

    /// Stop every component in declaration order, continuing past failures.
    ///
    /// Returns the number of components that failed to stop. Calling it again
    /// after the application stopped is a no-op.
    pub async fn stop(&mut self) -> usize {
        if matches!(self.state, AppState::Stopped | AppState::Uninitialized) {
            return 0;
        }
        self.state = AppState::Stopping;

        let mut failures = 0;
        for entry in self.components.values_mut() {
            if entry.info.status == ComponentStatus::Stopped {
                continue;
            }
            match entry.instance.stop().await {
                Ok(()) => info!(component = %entry.info.id, "component stopped"),
                Err(source) => {
                    let err = FrameError::ComponentStop {
                        id: entry.info.id.to_string(),
                        source: Box::new(source),
                    };
                    error!(error = %err, cause = %err_source(&err), "component stop failed");
                    failures += 1;
                }
            }
            entry.info.status = ComponentStatus::Stopped;
        }

        if let Some(task) = self.signal_task.take() {
            task.abort();
        }
        self.state = AppState::Stopped;
        failures
    }

    /// Handle that triggers the same path as a termination signal.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// The application id.
    pub fn id(&self) -> &ApplicationId {
        &self.id
    }

    /// Main or sub process.
    pub fn process_type(&self) -> ProcessType {
        self.process_type
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AppState {
        self.state
    }

    /// Look up a component by id.
    pub fn component(&self, id: &str) -> Option<&ComponentInfo> {
        self.components
            .values()
            .map(|entry| &entry.info)
            .find(|info| info.id == id)
    }

    /// Every imported component, in declaration order.
    pub fn components(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.components.values().map(|entry| &entry.info)
    }

    /// Number of imported components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether no components were imported.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

fn err_source(err: &FrameError) -> String {
    std::error::Error::source(err)
        .map(|source| source.to_string())
        .unwrap_or_default()
}
