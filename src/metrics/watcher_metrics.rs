//! Per-key configuration reload metrics using OpenTelemetry.

use crate::error::Result;
use crate::watch::LoadOutcome;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::time::Duration;

/// Metrics collector for configuration watchers.
///
/// Every measurement carries a `config.key` attribute naming the watched key.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_daemon::metrics::WatcherMetrics;
/// use opentelemetry::global;
///
/// let metrics = WatcherMetrics::new(global::meter("hotswap-daemon"));
/// ```
#[derive(Clone)]
pub struct WatcherMetrics {
    reload_attempts: Counter<u64>,
    reload_success: Counter<u64>,
    reload_skipped: Counter<u64>,
    reload_failures: Counter<u64>,
    reload_duration: Histogram<f64>,
    version: Gauge<i64>,
}

impl WatcherMetrics {
    /// Create a collector from `meter`.
    pub fn new(meter: Meter) -> Self {
        let reload_attempts = meter
            .u64_counter("hotswap_daemon.reload.attempts")
            .with_description("Total number of configuration reload attempts")
            .build();

        let reload_success = meter
            .u64_counter("hotswap_daemon.reload.success")
            .with_description("Reloads that published new content")
            .build();

        let reload_skipped = meter
            .u64_counter("hotswap_daemon.reload.skipped")
            .with_description("Reloads skipped because content was empty or unchanged")
            .build();

        let reload_failures = meter
            .u64_counter("hotswap_daemon.reload.failures")
            .with_description("Reloads that failed to read or decode")
            .build();

        let reload_duration = meter
            .f64_histogram("hotswap_daemon.reload.duration")
            .with_description("Duration of reload operations in seconds")
            .with_unit("s")
            .build();

        let version = meter
            .i64_gauge("hotswap_daemon.config.version")
            .with_description("Current configuration version")
            .build();

        Self {
            reload_attempts,
            reload_success,
            reload_skipped,
            reload_failures,
            reload_duration,
            version,
        }
    }

    /// Record one reload of `key` that took `elapsed`.
    pub fn record_reload(&self, key: &str, elapsed: Duration, outcome: &Result<LoadOutcome>) {
        let attributes = [KeyValue::new("config.key", key.to_string())];

        self.reload_attempts.add(1, &attributes);
        self.reload_duration.record(elapsed.as_secs_f64(), &attributes);

        match outcome {
            Ok(LoadOutcome::Updated { version }) => {
                self.reload_success.add(1, &attributes);
                self.version
                    .record(i64::try_from(*version).unwrap_or(i64::MAX), &attributes);
            }
            Ok(LoadOutcome::Empty | LoadOutcome::Unchanged) => {
                self.reload_skipped.add(1, &attributes);
            }
            Err(_) => self.reload_failures.add(1, &attributes),
        }
    }
}
