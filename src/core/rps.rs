//! Periodic throughput reporting
//!
//! The driver runs one [`RpsTracker`] on a background thread. Every tick it
//! turns the monitor's cumulative success counters into requests-per-second
//! gauges, logs a one-line summary of the run, and flags the common
//! misconfiguration where workers cannot keep up with the configured rate.

use crate::core::{Monitor, RateLimiter};
use std::time::Instant;
use tracing::{info, warn};

/// Turns cumulative counters into per-interval throughput gauges
///
/// Tick it from a timer loop; each [`update`](RpsTracker::update) covers the
/// time since the previous one.
pub struct RpsTracker {
    last_reads: u64,
    last_writes: u64,
    last_tick: Instant,
}

impl RpsTracker {
    pub fn new() -> Self {
        RpsTracker {
            last_reads: 0,
            last_writes: 0,
            last_tick: Instant::now(),
        }
    }

    /// Compute throughput since the last tick and publish it to `monitor`
    ///
    /// `reads_running`/`writes_running` suppress the bottleneck warning for
    /// a direction whose pool has already stopped.
    pub fn update(
        &mut self,
        monitor: &dyn Monitor,
        read_limiter: &RateLimiter,
        write_limiter: &RateLimiter,
        reads_running: bool,
        writes_running: bool,
    ) {
        let now = Instant::now();
        let secs = now.duration_since(self.last_tick).as_secs_f64();
        if secs <= 0.0 {
            return;
        }

        let reads = monitor.read_success();
        let writes = monitor.write_success();
        // Counters may have been reset since the last tick
        let read_delta = reads.saturating_sub(self.last_reads);
        let write_delta = writes.saturating_sub(self.last_writes);
        let read_rps = (read_delta as f64 / secs).round() as u64;
        let write_rps = (write_delta as f64 / secs).round() as u64;

        monitor.set_read_rps(read_rps);
        monitor.set_write_rps(write_rps);
        self.last_reads = reads;
        self.last_writes = writes;
        self.last_tick = now;

        info!(
            read_rps,
            write_rps,
            read_failures = monitor.read_failure(),
            write_failures = monitor.write_failure(),
            cache_hit_ratio = format!("{:.1}%", monitor.cache_hit_ratio()),
            "throughput"
        );

        self.warn_if_lagging("read", read_rps, read_limiter.rate(), reads_running);
        self.warn_if_lagging("write", write_rps, write_limiter.rate(), writes_running);
    }

    fn warn_if_lagging(&self, direction: &str, observed: u64, target: f64, running: bool) {
        // 90% of target leaves headroom for rounding and ramp edges
        if running && target > 0.0 && (observed as f64) < target * 0.9 {
            warn!(
                direction,
                observed,
                target,
                "observed throughput below the configured rate; \
                 workers or the backend may be the bottleneck"
            );
        }
    }
}

impl Default for RpsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CoreMonitor;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn update_publishes_interval_deltas() {
        let monitor = CoreMonitor::new();
        let limiter = RateLimiter::new(0.0);
        let mut tracker = RpsTracker::new();

        for _ in 0..100 {
            monitor.inc_read_success();
        }
        for _ in 0..40 {
            monitor.inc_write_success();
        }
        thread::sleep(Duration::from_millis(100));
        tracker.update(&monitor, &limiter, &limiter, true, true);

        // ~100 reads over ~0.1s => on the order of 1000 rps
        assert!(monitor.read_rps() > 0);
        assert!(monitor.write_rps() > 0);
        assert!(monitor.read_rps() > monitor.write_rps());
    }

    #[test]
    fn second_tick_only_counts_new_operations() {
        let monitor = CoreMonitor::new();
        let limiter = RateLimiter::new(0.0);
        let mut tracker = RpsTracker::new();

        for _ in 0..50 {
            monitor.inc_read_success();
        }
        thread::sleep(Duration::from_millis(50));
        tracker.update(&monitor, &limiter, &limiter, true, true);

        // no new operations before the second tick
        thread::sleep(Duration::from_millis(50));
        tracker.update(&monitor, &limiter, &limiter, true, true);
        assert_eq!(monitor.read_rps(), 0);
    }

    #[test]
    fn reset_between_ticks_does_not_underflow() {
        let monitor = CoreMonitor::new();
        let limiter = RateLimiter::new(0.0);
        let mut tracker = RpsTracker::new();

        for _ in 0..50 {
            monitor.inc_read_success();
        }
        thread::sleep(Duration::from_millis(20));
        tracker.update(&monitor, &limiter, &limiter, true, true);

        monitor.reset_stats();
        thread::sleep(Duration::from_millis(20));
        tracker.update(&monitor, &limiter, &limiter, true, true);
        assert_eq!(monitor.read_rps(), 0);
    }
}
