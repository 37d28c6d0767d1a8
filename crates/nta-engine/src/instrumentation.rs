//! Profiling timers and run metrics
//!
//! Regions keep a [`Timer`] around their compute body while profiling is
//! enabled. The network reports each `run` through [`RunMetrics`], which logs
//! a structured event and forwards to the performance tracing layer.

use std::time::{Duration, Instant};

/// Accumulating stopwatch.
#[derive(Clone, Debug, Default)]
pub struct Timer {
    elapsed: Duration,
    starts: u64,
    started: Option<Instant>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
            self.starts += 1;
        }
    }

    pub fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.elapsed += started.elapsed();
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// Total time across completed and running intervals.
    pub fn elapsed(&self) -> Duration {
        self.elapsed + self.started.map_or(Duration::ZERO, |started| started.elapsed())
    }

    pub fn start_count(&self) -> u64 {
        self.starts
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Metrics for one `Network::run` call
#[derive(Debug, Clone)]
pub struct RunMetrics {
    pub iterations: u64,
    pub regions: usize,
    pub duration_us: u64,
}

impl RunMetrics {
    pub fn new(iterations: u64, regions: usize, start: Instant) -> Self {
        Self {
            iterations,
            regions,
            duration_us: start.elapsed().as_micros() as u64,
        }
    }

    pub fn iterations_per_sec(&self) -> f64 {
        if self.duration_us == 0 {
            return 0.0;
        }
        self.iterations as f64 * 1_000_000.0 / self.duration_us as f64
    }

    /// Log via tracing
    pub fn log(&self) {
        tracing::debug!(
            iterations = self.iterations,
            regions = self.regions,
            duration_us = self.duration_us,
            iterations_per_sec = self.iterations_per_sec(),
            "network_run"
        );
        if nta_tracing::performance::enabled() {
            nta_tracing::performance::record_network_run(self.iterations, self.regions, self.duration_us);
        }
    }
}
