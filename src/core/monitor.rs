//! Thread-safe benchmark statistics
//!
//! Counters use relaxed atomics so that increments from many concurrent
//! workers never serialize against each other; the latency histograms sit
//! behind one short-lived mutex per direction, so a read-latency update
//! cannot block a write-success increment. Designed for minimal overhead
//! in the hot path.

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Highest latency the histograms can record: one hour in microseconds.
/// Slower samples are clamped to this bound rather than dropped.
const MAX_LATENCY_MICROS: u64 = 3_600_000_000;

/// The stats-reporting surface consumed by external metrics sinks
///
/// All methods are callable from arbitrarily many worker threads without
/// external locking. Counters only move forward except across
/// [`reset_stats`](Monitor::reset_stats); increments racing a reset may be
/// lost but never corrupt internal state.
pub trait Monitor: Send + Sync {
    fn inc_read_success(&self);
    fn inc_read_failure(&self);
    fn inc_write_success(&self);
    fn inc_write_failure(&self);
    fn inc_cache_hit(&self);
    fn inc_cache_miss(&self);

    /// Record one read latency sample in microseconds
    fn record_read_latency(&self, micros: u64);
    /// Record one write latency sample in microseconds
    fn record_write_latency(&self, micros: u64);

    fn read_success(&self) -> u64;
    fn read_failure(&self) -> u64;
    fn write_success(&self) -> u64;
    fn write_failure(&self) -> u64;
    fn cache_hit(&self) -> u64;
    fn cache_miss(&self) -> u64;

    /// Percentile summary of read latencies in microseconds
    fn read_latency(&self) -> LatencySummary;
    /// Percentile summary of write latencies in microseconds
    fn write_latency(&self) -> LatencySummary;

    /// Throughput gauges maintained by the periodic reporter
    fn set_read_rps(&self, rps: u64);
    fn set_write_rps(&self, rps: u64);
    fn read_rps(&self) -> u64;
    fn write_rps(&self) -> u64;

    /// Percentage of completed reads that found a value, 0 when idle
    fn cache_hit_ratio(&self) -> f64 {
        let hits = self.cache_hit();
        let total = hits + self.cache_miss();
        if total == 0 {
            return 0.0;
        }
        hits as f64 * 100.0 / total as f64
    }

    /// Zero every counter and histogram
    fn reset_stats(&self);

    /// A serializable point-in-time view of every field
    fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            read_success: self.read_success(),
            read_failure: self.read_failure(),
            write_success: self.write_success(),
            write_failure: self.write_failure(),
            cache_hit: self.cache_hit(),
            cache_miss: self.cache_miss(),
            cache_hit_ratio: self.cache_hit_ratio(),
            read_rps: self.read_rps(),
            write_rps: self.write_rps(),
            read_latency: self.read_latency(),
            write_latency: self.write_latency(),
        }
    }

    /// Human-readable descriptions of every reported field
    fn documentation(&self) -> &'static [FieldDoc] {
        FIELD_DOCS
    }
}

/// Latency percentiles in microseconds; all zero when no samples exist
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LatencySummary {
    pub avg: f64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub p995: u64,
    pub p999: u64,
}

/// Point-in-time view of the full monitor surface
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub read_success: u64,
    pub read_failure: u64,
    pub write_success: u64,
    pub write_failure: u64,
    pub cache_hit: u64,
    pub cache_miss: u64,
    pub cache_hit_ratio: f64,
    pub read_rps: u64,
    pub write_rps: u64,
    pub read_latency: LatencySummary,
    pub write_latency: LatencySummary,
}

/// Name and description of one reported field
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldDoc {
    pub name: &'static str,
    pub help: &'static str,
}

static FIELD_DOCS: &[FieldDoc] = &[
    FieldDoc { name: "read_success", help: "Completed read operations, including cache misses" },
    FieldDoc { name: "read_failure", help: "Read operations that raised a client error" },
    FieldDoc { name: "write_success", help: "Completed write operations" },
    FieldDoc { name: "write_failure", help: "Write operations that raised a client error" },
    FieldDoc { name: "cache_hit", help: "Reads that found a non-empty value" },
    FieldDoc { name: "cache_miss", help: "Reads that completed but found no value" },
    FieldDoc { name: "cache_hit_ratio", help: "cache_hit as a percentage of completed reads" },
    FieldDoc { name: "read_rps", help: "Observed read throughput over the last reporting window" },
    FieldDoc { name: "write_rps", help: "Observed write throughput over the last reporting window" },
    FieldDoc { name: "read_latency", help: "Read latency percentiles in microseconds (avg/p50/p95/p99/p99.5/p99.9)" },
    FieldDoc { name: "write_latency", help: "Write latency percentiles in microseconds (avg/p50/p95/p99/p99.5/p99.9)" },
];

/// Default [`Monitor`] implementation backed by atomics and HDR histograms
pub struct CoreMonitor {
    read_success: AtomicU64,
    read_failure: AtomicU64,
    write_success: AtomicU64,
    write_failure: AtomicU64,
    cache_hit: AtomicU64,
    cache_miss: AtomicU64,
    read_rps: AtomicU64,
    write_rps: AtomicU64,
    read_latency: Mutex<Histogram<u64>>,
    write_latency: Mutex<Histogram<u64>>,
}

fn new_latency_histogram() -> Histogram<u64> {
    // Three significant figures between 1us and one hour; these constants
    // satisfy the histogram's documented bounds, so creation cannot fail.
    Histogram::new_with_bounds(1, MAX_LATENCY_MICROS, 3)
        .expect("latency histogram bounds are valid")
}

fn summarize(histogram: &Histogram<u64>) -> LatencySummary {
    if histogram.is_empty() {
        return LatencySummary::default();
    }
    LatencySummary {
        avg: histogram.mean(),
        p50: histogram.value_at_quantile(0.50),
        p95: histogram.value_at_quantile(0.95),
        p99: histogram.value_at_quantile(0.99),
        p995: histogram.value_at_quantile(0.995),
        p999: histogram.value_at_quantile(0.999),
    }
}

impl CoreMonitor {
    pub fn new() -> Self {
        CoreMonitor {
            read_success: AtomicU64::new(0),
            read_failure: AtomicU64::new(0),
            write_success: AtomicU64::new(0),
            write_failure: AtomicU64::new(0),
            cache_hit: AtomicU64::new(0),
            cache_miss: AtomicU64::new(0),
            read_rps: AtomicU64::new(0),
            write_rps: AtomicU64::new(0),
            read_latency: Mutex::new(new_latency_histogram()),
            write_latency: Mutex::new(new_latency_histogram()),
        }
    }
}

impl Default for CoreMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor for CoreMonitor {
    fn inc_read_success(&self) {
        self.read_success.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_read_failure(&self) {
        self.read_failure.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_write_success(&self) {
        self.write_success.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_write_failure(&self) {
        self.write_failure.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_cache_hit(&self) {
        self.cache_hit.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_cache_miss(&self) {
        self.cache_miss.fetch_add(1, Ordering::Relaxed);
    }

    fn record_read_latency(&self, micros: u64) {
        self.read_latency
            .lock()
            .saturating_record(micros.max(1));
    }

    fn record_write_latency(&self, micros: u64) {
        self.write_latency
            .lock()
            .saturating_record(micros.max(1));
    }

    fn read_success(&self) -> u64 {
        self.read_success.load(Ordering::Relaxed)
    }

    fn read_failure(&self) -> u64 {
        self.read_failure.load(Ordering::Relaxed)
    }

    fn write_success(&self) -> u64 {
        self.write_success.load(Ordering::Relaxed)
    }

    fn write_failure(&self) -> u64 {
        self.write_failure.load(Ordering::Relaxed)
    }

    fn cache_hit(&self) -> u64 {
        self.cache_hit.load(Ordering::Relaxed)
    }

    fn cache_miss(&self) -> u64 {
        self.cache_miss.load(Ordering::Relaxed)
    }

    fn read_latency(&self) -> LatencySummary {
        summarize(&self.read_latency.lock())
    }

    fn write_latency(&self) -> LatencySummary {
        summarize(&self.write_latency.lock())
    }

    fn set_read_rps(&self, rps: u64) {
        self.read_rps.store(rps, Ordering::Relaxed);
    }

    fn set_write_rps(&self, rps: u64) {
        self.write_rps.store(rps, Ordering::Relaxed);
    }

    fn read_rps(&self) -> u64 {
        self.read_rps.load(Ordering::Relaxed)
    }

    fn write_rps(&self) -> u64 {
        self.write_rps.load(Ordering::Relaxed)
    }

    fn reset_stats(&self) {
        self.read_success.store(0, Ordering::Relaxed);
        self.read_failure.store(0, Ordering::Relaxed);
        self.write_success.store(0, Ordering::Relaxed);
        self.write_failure.store(0, Ordering::Relaxed);
        self.cache_hit.store(0, Ordering::Relaxed);
        self.cache_miss.store(0, Ordering::Relaxed);
        self.read_rps.store(0, Ordering::Relaxed);
        self.write_rps.store(0, Ordering::Relaxed);
        self.read_latency.lock().reset();
        self.write_latency.lock().reset();
    }
}
