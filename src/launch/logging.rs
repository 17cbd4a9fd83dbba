//! Process-wide tracing subscriber with a runtime-adjustable level.

use crate::error::{FrameError, Result};
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

/// Environment variable that overrides the initial filter directive.
pub const LOG_ENV: &str = "HOTSWAP_LOG";

/// Map a level description onto a filter.
///
/// Accepts `ALL`, `TRACE`, `DEBUG`, `INFO`, `WARN`/`WARNING`, `ERROR` and `OFF`,
/// case-insensitively.
pub fn level_from_desc(desc: &str) -> Option<LevelFilter> {
    match desc.trim().to_ascii_uppercase().as_str() {
        "ALL" | "TRACE" => Some(LevelFilter::TRACE),
        "DEBUG" => Some(LevelFilter::DEBUG),
        "INFO" => Some(LevelFilter::INFO),
        "WARN" | "WARNING" => Some(LevelFilter::WARN),
        "ERROR" => Some(LevelFilter::ERROR),
        "OFF" => Some(LevelFilter::OFF),
        _ => None,
    }
}

/// Handle onto the installed subscriber's filter.
#[derive(Clone)]
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    /// Replace the active filter with the level described by `desc`.
    ///
    /// Returns `false`, leaving the filter unchanged, if `desc` is not a known level.
    pub fn set_level_by_desc(&self, desc: &str) -> bool {
        let Some(level) = level_from_desc(desc) else {
            return false;
        };

        match self.filter.reload(EnvFilter::new(level.to_string())) {
            Ok(()) => {
                info!(level = %level, "log level changed");
                true
            }
            Err(_) => false,
        }
    }

    /// The active filter directive.
    pub fn current(&self) -> Option<String> {
        self.filter.with_current(|filter| filter.to_string()).ok()
    }
}

/// Install the global subscriber.
///
/// The initial filter comes from `HOTSWAP_LOG`, then `RUST_LOG`, then `default_level`.
///
/// # Errors
///
/// Returns [`FrameError::Logging`] if a global subscriber is already installed or
/// the filter directive is invalid.
pub fn init_logging(default_level: &str) -> Result<LogHandle> {
    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive),
        Err(_) => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level)),
    }
    .map_err(|e| FrameError::Logging(e.to_string()))?;

    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| FrameError::Logging(e.to_string()))?;

    Ok(LogHandle { filter: handle })
}
