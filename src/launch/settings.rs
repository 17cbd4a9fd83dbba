//! Process-level settings: where the launch descriptor lives and how to run.

use crate::core::ProcessType;
use crate::error::{FrameError, Result};
use crate::launch::launcher::LaunchOptions;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default environment prefix for settings overrides (`HOTSWAP_WORK_DIR`, ...).
pub const ENV_PREFIX: &str = "HOTSWAP";

/// Settings that select and shape a launch.
///
/// Loaded from an optional settings file (YAML, TOML or JSON, by extension)
/// overlaid with `HOTSWAP_*` environment variables. Nested keys use `__`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    /// Path of the launch descriptor
    pub launch_config: PathBuf,
    /// Working directory; dev-mode templates live under `configs/template`
    pub work_dir: PathBuf,
    /// Resolve every configuration file from the template layout
    pub dev_mode: bool,
    /// Log level used until the descriptor's level is applied
    pub log_level: String,
    /// Directory for the pid file, none to skip it
    pub pid_dir: Option<PathBuf>,
    /// `1` for the main process, `2` for a sub-process
    pub process_type: u8,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            launch_config: PathBuf::from("launch.json"),
            work_dir: PathBuf::from("."),
            dev_mode: false,
            log_level: "info".to_string(),
            pid_dir: None,
            process_type: ProcessType::Main.code(),
        }
    }
}

impl FrameSettings {
    /// Load settings from `file` (if given) and `HOTSWAP_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Settings`] if the file cannot be read or a value has
    /// the wrong type.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(file, ENV_PREFIX)
    }

    /// Like [`load`](Self::load) with a custom environment prefix.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Settings`] if the file cannot be read or a value has
    /// the wrong type.
    pub fn load_with_prefix(file: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| FrameError::Settings(e.to_string()))?;

        settings
            .try_deserialize::<Self>()
            .map_err(|e| FrameError::Settings(e.to_string()))
    }

    /// Convert into launch options.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Settings`] for an unknown process type.
    pub fn into_launch_options(self) -> Result<LaunchOptions> {
        let process_type = ProcessType::from_code(self.process_type).ok_or_else(|| {
            FrameError::Settings(format!("unknown process type {}", self.process_type))
        })?;

        Ok(LaunchOptions {
            launch_config: self.launch_config,
            work_dir: self.work_dir,
            dev_mode: self.dev_mode,
            pid_dir: self.pid_dir,
            process_type,
            ..LaunchOptions::default()
        })
    }
}
