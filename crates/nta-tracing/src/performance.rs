//! Timing helpers for the engine's hot paths.
//!
//! Performance tracing is a process-wide switch set from
//! [`crate::TracingConfig`] by [`configure`] (called by
//! [`crate::init_global_tracing`]). When off, [`PerformanceSpan::start`]
//! returns `None` and the engine skips the clock reads entirely.
//!
//! ## Example
//!
//! ```rust
//! use nta_tracing::performance::{PerformanceSpan, record_link_copy};
//!
//! let span = PerformanceSpan::new("prepare_inputs", Some(100));
//! // ... copy link data ...
//! drop(span); // logged only if it took 100µs or more
//!
//! record_link_copy("[a.out to b.in]", 256, 3);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use tracing::Level;

use crate::TracingConfig;

static ENABLED: AtomicBool = AtomicBool::new(false);
// u64::MAX encodes "no threshold".
static THRESHOLD_US: AtomicU64 = AtomicU64::new(u64::MAX);

/// Apply the performance settings of `config` process-wide.
pub fn configure(config: &TracingConfig) {
    ENABLED.store(config.enable_performance_tracing, Ordering::Relaxed);
    THRESHOLD_US.store(config.performance_threshold_us.unwrap_or(u64::MAX), Ordering::Relaxed);
}

/// Whether performance spans are currently recorded.
pub fn enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// The configured logging threshold in microseconds, if any.
pub fn threshold_us() -> Option<u64> {
    match THRESHOLD_US.load(Ordering::Relaxed) {
        u64::MAX => None,
        threshold => Some(threshold),
    }
}

/// RAII timer that logs `performance_span_complete` on drop.
///
/// Nothing is logged when the measured duration is under the threshold.
pub struct PerformanceSpan {
    name: String,
    threshold_us: Option<u64>,
    started: Instant,
    span: tracing::Span,
}

impl PerformanceSpan {
    /// A span at debug level.
    pub fn new(name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        Self::with_level(Level::DEBUG, name, threshold_us)
    }

    pub fn with_level(level: Level, name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        let name = name.into();
        let span = match level {
            Level::TRACE => tracing::trace_span!("perf", name = %name),
            Level::DEBUG => tracing::debug_span!("perf", name = %name),
            Level::INFO => tracing::info_span!("perf", name = %name),
            Level::WARN => tracing::warn_span!("perf", name = %name),
            Level::ERROR => tracing::error_span!("perf", name = %name),
        };
        Self {
            name,
            threshold_us,
            started: Instant::now(),
            span,
        }
    }

    /// A span using the process-wide settings, or `None` when performance
    /// tracing is switched off.
    pub fn start(name: impl Into<String>) -> Option<Self> {
        enabled().then(|| Self::new(name, threshold_us()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elapsed_us(&self) -> u64 {
        self.started.elapsed().as_micros() as u64
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for PerformanceSpan {
    fn drop(&mut self) {
        let elapsed_us = self.elapsed_us();
        if self.threshold_us.is_none_or(|threshold| elapsed_us >= threshold) {
            let _entered = self.span.enter();
            tracing::debug!(
                duration_us = elapsed_us,
                duration_ms = elapsed_us as f64 / 1000.0,
                "performance_span_complete"
            );
        }
    }
}

/// One region compute call.
pub fn record_region_compute(region: &str, node_type: &str, nodes: usize, duration_us: u64) {
    tracing::debug!(
        event = "region_compute",
        region = region,
        node_type = node_type,
        nodes = nodes,
        duration_us = duration_us,
        "region_compute_complete"
    );
}

/// One link copy, with the achieved bandwidth.
pub fn record_link_copy(link: &str, bytes: usize, duration_us: u64) {
    let bandwidth_mbps = if duration_us > 0 {
        (bytes as f64 / duration_us as f64) * 1_000_000.0 / (1024.0 * 1024.0)
    } else {
        0.0
    };
    tracing::trace!(
        event = "link_copy",
        link = link,
        bytes = bytes,
        duration_us = duration_us,
        bandwidth_mbps = bandwidth_mbps,
        "link_copy_complete"
    );
}

/// A completed `run(n)` call.
pub fn record_network_run(iterations: u64, regions: usize, duration_us: u64) {
    let iterations_per_sec = if duration_us > 0 {
        iterations as f64 / duration_us as f64 * 1_000_000.0
    } else {
        0.0
    };
    tracing::debug!(
        event = "network_run",
        iterations = iterations,
        regions = regions,
        duration_us = duration_us,
        iterations_per_sec = iterations_per_sec,
        "network_run_complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn span_keeps_name_and_threshold() {
        let span = PerformanceSpan::new("compute", Some(50));
        assert_eq!(span.name(), "compute");
        assert_eq!(span.threshold_us, Some(50));

        let span = PerformanceSpan::with_level(Level::INFO, "run", None);
        assert_eq!(span.threshold_us, None);
    }

    #[test]
    fn span_measures_elapsed_time() {
        let span = PerformanceSpan::new("sleep", None);
        thread::sleep(Duration::from_millis(5));
        assert!(span.elapsed_us() >= 5_000);
    }

    #[test]
    #[serial]
    fn configure_toggles_start() {
        configure(&TracingConfig {
            enable_performance_tracing: false,
            ..TracingConfig::for_ci()
        });
        assert!(PerformanceSpan::start("off").is_none());

        configure(&TracingConfig {
            enable_performance_tracing: true,
            performance_threshold_us: Some(10),
            ..TracingConfig::for_ci()
        });
        assert!(enabled());
        assert_eq!(threshold_us(), Some(10));
        let span = PerformanceSpan::start("on");
        assert_eq!(span.map(|s| s.threshold_us), Some(Some(10)));

        configure(&TracingConfig::for_ci());
        assert!(!enabled());
        assert_eq!(threshold_us(), None);
    }

    #[test]
    fn record_helpers_do_not_panic() {
        record_region_compute("level1", "TestNode", 32, 12);
        record_link_copy("[a.out to b.in]", 4096, 0);
        record_network_run(10, 3, 900);
    }
}
