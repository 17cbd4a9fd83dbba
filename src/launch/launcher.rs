//! End-to-end daemon launch: descriptor, watchers, components, wait, stop.

use crate::core::{
    AppHooks, Application, ApplicationId, FrameContext, NoHooks, ProcessType, Shutdown,
    ShutdownReason,
};
use crate::error::Result;
use crate::launch::descriptor::LaunchDescriptor;
use crate::launch::logging::LogHandle;
use crate::launch::process::{PidFile, SUB_PROCESS_DELAY, spawn_sub_processes};
use crate::watch::{ConfigWatcherManager, TEMPLATE_DIR};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How to launch a daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Launch descriptor path (a file name under the template dir in dev mode)
    pub launch_config: PathBuf,
    /// Working directory
    pub work_dir: PathBuf,
    /// Resolve the descriptor and every configuration file from the template layout
    pub dev_mode: bool,
    /// Where to write `<app_id>.pid`; `None` skips the pid file
    pub pid_dir: Option<PathBuf>,
    /// Main process or sub-process
    pub process_type: ProcessType,
    /// Delay before sub-processes are spawned
    pub sub_process_delay: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            launch_config: PathBuf::from("launch.json"),
            work_dir: PathBuf::from("."),
            dev_mode: false,
            pid_dir: None,
            process_type: ProcessType::Main,
            sub_process_delay: SUB_PROCESS_DELAY,
        }
    }
}

impl LaunchOptions {
    /// Options reading the descriptor at `launch_config`.
    pub fn new(launch_config: impl Into<PathBuf>) -> Self {
        Self {
            launch_config: launch_config.into(),
            ..Self::default()
        }
    }

    /// Set the working directory.
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Enable or disable dev mode.
    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    /// Write a pid file under `pid_dir`.
    pub fn with_pid_dir(mut self, pid_dir: impl Into<PathBuf>) -> Self {
        self.pid_dir = Some(pid_dir.into());
        self
    }

    /// Set the process type.
    pub fn with_process_type(mut self, process_type: ProcessType) -> Self {
        self.process_type = process_type;
        self
    }

    /// Set the delay before sub-processes are spawned.
    pub fn with_sub_process_delay(mut self, delay: Duration) -> Self {
        self.sub_process_delay = delay;
        self
    }

    /// Effective path of the launch descriptor.
    pub fn descriptor_path(&self) -> PathBuf {
        if self.dev_mode {
            self.work_dir.join(TEMPLATE_DIR).join(&self.launch_config)
        } else {
            self.launch_config.clone()
        }
    }
}

/// Outcome of a completed stop sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    /// What triggered shutdown
    pub reason: ShutdownReason,
    /// Components whose `stop` failed
    pub component_failures: usize,
    /// Configuration watchers that failed to stop
    pub watcher_failures: usize,
}

/// Builds a [`RunningDaemon`] from a [`FrameContext`] and [`LaunchOptions`].
pub struct Launcher<'a> {
    context: &'a FrameContext,
    options: LaunchOptions,
    hooks: Arc<dyn AppHooks>,
    log: Option<LogHandle>,
}

impl<'a> Launcher<'a> {
    /// Create a launcher without hooks.
    pub fn new(context: &'a FrameContext, options: LaunchOptions) -> Self {
        Self {
            context,
            options,
            hooks: Arc::new(NoHooks),
            log: None,
        }
    }

    /// Run `hooks` at the application extension points.
    pub fn with_hooks<H: AppHooks + 'static>(mut self, hooks: H) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Apply the descriptor's `log_level` through `handle`.
    pub fn with_log_handle(mut self, handle: LogHandle) -> Self {
        self.log = Some(handle);
        self
    }

    /// Bring the daemon up: load the descriptor, start configuration watchers,
    /// import and start every component.
    ///
    /// On failure everything brought up so far is stopped again before the
    /// error is returned.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use hotswap_daemon::prelude::*;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<()> {
    /// let context = FrameContext::builder()
    ///     .register_config(ConfigRegistration::new(
    ///         "routes",
    ///         TypedConfig::<serde_json::Value>::json(),
    ///     ))
    ///     .build();
    ///
    /// let daemon = Launcher::new(&context, LaunchOptions::new("/etc/echo/launch.json"))
    ///     .prepare()
    ///     .await?;
    /// tracing::info!(components = daemon.application().len(), "daemon running");
    ///
    /// let report = daemon.wait_and_stop().await?;
    /// tracing::info!(reason = %report.reason, "daemon stopped");
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: an unreadable descriptor, a must-load
    /// configuration that is missing, signal installation failure, an
    /// unregistered component type, or a component failing to initialize or start.
    pub async fn prepare(self) -> Result<RunningDaemon> {
        info!(args = %std::env::args().collect::<Vec<_>>().join(" "), "execution parameters");

        let descriptor_path = self.options.descriptor_path();
        info!(path = %descriptor_path.display(), "loading launch descriptor");
        let descriptor = LaunchDescriptor::load(&descriptor_path)?;
        info!(app_id = %descriptor.app_id, components = descriptor.components.len(), "loaded launch descriptor");

        self.apply_log_level(&descriptor);
        if !descriptor.gc_control.is_null() {
            debug!(gc_control = %descriptor.gc_control, "runtime tuning section is not applicable, ignoring");
        }

        let pid_file = match &self.options.pid_dir {
            Some(dir) => Some(PidFile::create(dir, &descriptor.app_id)?),
            None => None,
        };

        let configs = match self.initialize_configs(&descriptor) {
            Ok(configs) => configs,
            Err(e) => {
                remove_pid_file(pid_file);
                return Err(e);
            }
        };
        configs.start();
        info!(count = configs.len(), "started configuration watchers");

        let mut app = Application::new();
        if let Err(e) = self.bring_up(&mut app, &configs, &descriptor).await {
            error!(error = %e, "launch failed, stopping what was started");
            app.stop().await;
            configs.stop();
            remove_pid_file(pid_file);
            return Err(e);
        }
        info!(app_id = %app.id(), "application is running");

        let sub_processes = (self.options.process_type == ProcessType::Main
            && descriptor.sub_process_list.enable)
            .then(|| {
                let list = descriptor.sub_process_list.clone();
                let delay = self.options.sub_process_delay;
                tokio::spawn(async move { spawn_sub_processes(&list, delay).await })
            });

        Ok(RunningDaemon {
            app,
            configs,
            descriptor,
            hooks: self.hooks,
            pid_file,
            sub_processes,
        })
    }

    fn apply_log_level(&self, descriptor: &LaunchDescriptor) {
        let Some(log) = &self.log else {
            return;
        };
        if descriptor.log_level.is_empty() {
            return;
        }
        if !log.set_level_by_desc(&descriptor.log_level) {
            warn!(level = %descriptor.log_level, "unknown log level in launch descriptor");
        }
    }

    fn initialize_configs(&self, descriptor: &LaunchDescriptor) -> Result<ConfigWatcherManager> {
        let context = self.context;
        let work_dir: &Path = &self.options.work_dir;

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &context.metrics {
            return ConfigWatcherManager::initialize_with_metrics(
                &context.configs,
                context.watcher_factory.as_ref(),
                work_dir,
                &descriptor.configs,
                self.options.dev_mode,
                metrics.clone(),
            );
        }

        ConfigWatcherManager::initialize(
            &context.configs,
            context.watcher_factory.as_ref(),
            work_dir,
            &descriptor.configs,
            self.options.dev_mode,
        )
    }

    async fn bring_up(
        &self,
        app: &mut Application,
        configs: &ConfigWatcherManager,
        descriptor: &LaunchDescriptor,
    ) -> Result<()> {
        app.base_initialize(
            ApplicationId::new(descriptor.app_id.as_str()),
            self.options.process_type,
        )?;
        self.hooks.initialize(configs).await?;

        app.import_components(&self.context.components, configs, &descriptor.components)
            .await?;
        app.start().await?;
        self.hooks.after_start(app).await?;
        Ok(())
    }
}

/// A daemon whose components are running.
pub struct RunningDaemon {
    app: Application,
    configs: ConfigWatcherManager,
    descriptor: LaunchDescriptor,
    hooks: Arc<dyn AppHooks>,
    pid_file: Option<PidFile>,
    sub_processes: Option<JoinHandle<Vec<Child>>>,
}

impl RunningDaemon {
    /// The running application.
    pub fn application(&self) -> &Application {
        &self.app
    }

    /// The configuration watchers.
    pub fn configs(&self) -> &ConfigWatcherManager {
        &self.configs
    }

    /// The launch descriptor in effect.
    pub fn descriptor(&self) -> &LaunchDescriptor {
        &self.descriptor
    }

    /// The pid file, if one was written.
    pub fn pid_file(&self) -> Option<&PidFile> {
        self.pid_file.as_ref()
    }

    /// Handle that triggers the same stop path as a termination signal.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.app.shutdown_handle()
    }

    /// Block until shutdown, then stop components (declaration order), then
    /// configuration watchers, then remove the pid file.
    ///
    /// # Errors
    ///
    /// The stop sequence itself never fails; individual failures are logged and
    /// counted in the returned report.
    pub async fn wait_and_stop(mut self) -> Result<StopReport> {
        let reason = self.app.forever().await;

        if let Some(task) = self.sub_processes.take() {
            task.abort();
        }
        if let Err(e) = self.hooks.before_stop(&self.app).await {
            warn!(error = %e, "before-stop hook failed");
        }

        info!(app_id = %self.app.id(), "stopping application");
        let component_failures = self.app.stop().await;
        let watcher_failures = self.configs.stop();
        remove_pid_file(self.pid_file.take());

        info!(
            app_id = %self.app.id(),
            %reason,
            component_failures,
            watcher_failures,
            "application stopped"
        );
        Ok(StopReport {
            reason,
            component_failures,
            watcher_failures,
        })
    }
}

fn remove_pid_file(pid_file: Option<PidFile>) {
    if let Some(pid_file) = pid_file {
        let path = pid_file.path().to_path_buf();
        if let Err(e) = pid_file.remove() {
            warn!(path = %path.display(), error = %e, "failed to remove pid file");
        }
    }
}

/// Launch a daemon with default hooks and block until it has stopped.
///
/// # Errors
///
/// Returns any fatal launch error from [`Launcher::prepare`].
pub async fn launch_daemon(context: &FrameContext, options: LaunchOptions) -> Result<StopReport> {
    Launcher::new(context, options)
        .prepare()
        .await?
        .wait_and_stop()
        .await
}
