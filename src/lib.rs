//! # hotswap-daemon
//!
//! Assemble long-running daemons from registered components, wire them to
//! hot-reloadable on-disk configuration, and drive the process lifecycle.
//!
//! ## Overview
//!
//! `hotswap-daemon` combines two subsystems:
//! - **Component lifecycle orchestration**: a registry of component types, an
//!   [`Application`](core::Application) that imports, starts and stops them in
//!   declaration order, and signal-driven shutdown.
//! - **Configuration watching**: one [`ConfigWatcher`](watch::ConfigWatcher) per
//!   key that watches the file's directory, deduplicates reloads by content hash,
//!   keeps a monotonic version and dispatches typed callbacks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use hotswap_daemon::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct EchoArgs {
//!     server_addr: String,
//! }
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Routes {
//!     upstream: String,
//! }
//!
//! #[derive(Default)]
//! struct Echo;
//!
//! #[async_trait]
//! impl Component for Echo {
//!     async fn initialize(&mut self, ctx: &InitContext<'_>, kw: KeywordArgs) -> Result<()> {
//!         let args = kw.downcast::<EchoArgs>()?;
//!         ctx.configs.register_callback("routes", CallbackType::Update, || {
//!             tracing::info!("routes changed");
//!         })?;
//!         tracing::info!(addr = %args.server_addr, "echo configured");
//!         Ok(())
//!     }
//!
//!     async fn start(&mut self) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     async fn stop(&mut self) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let context = FrameContext::builder()
//!     .register_component::<EchoArgs, _>(ComponentPriority::General, "Echo", || Box::new(Echo))
//!     .register_config(ConfigRegistration::new("routes", TypedConfig::<Routes>::json()))
//!     .build();
//!
//! launch_daemon(&context, LaunchOptions::new("launch.json")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `file-watch` (default): OS file notifications through `notify`
//! - `yaml`, `toml`: extra payload formats for [`TypedConfig`](watch::TypedConfig)
//! - `metrics`: OpenTelemetry reload metrics

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod launch;
pub mod watch;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{
        AppHooks, Application, Component, ComponentPriority, FrameContext, InitContext,
        KeywordArgs, NoKeywordArgs, ProcessType, Shutdown, Validate,
    };
    pub use crate::error::{FrameError, Result, ValidationError};
    pub use crate::launch::{
        LaunchOptions, Launcher, RunningDaemon, StopReport, init_logging, launch_daemon,
    };
    pub use crate::watch::{
        CallbackType, ConfigHandler, ConfigRegistration, MemoryWatcherFactory, TypedConfig,
    };
}
