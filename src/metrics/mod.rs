//! OpenTelemetry metrics for configuration watchers.
//!
//! Tracks, per configuration key:
//! - reload attempts, successes, skips and failures
//! - reload duration
//! - current version
//!
//! # Examples
//!
//! ```rust,no_run
//! use hotswap_daemon::prelude::*;
//! use hotswap_daemon::metrics::WatcherMetrics;
//! use opentelemetry::global;
//!
//! let context = FrameContext::builder()
//!     .with_metrics(WatcherMetrics::new(global::meter("my-daemon")))
//!     .build();
//! ```

mod watcher_metrics;

pub use watcher_metrics::WatcherMetrics;
