//! Read and write operations executed by worker threads
//!
//! A [`BenchOperation`] wraps one client call with the bookkeeping the
//! driver cares about: latency timing strictly around the client call,
//! success/failure/cache-miss accounting on the shared [`Monitor`], and the
//! optional auto-tune feedback loop into the shared [`RateLimiter`]. Workers
//! stay generic over the operation, so the read and write sides of a run are
//! the same machinery pointed at different operations.

use crate::client::Client;
use crate::core::{BenchError, Monitor, RateLimiter};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Which side of the run an operation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Read,
    Write,
}

/// Outcome of one operation attempt, after monitor accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    /// The client call returned, successfully or as a counted cache miss
    Completed,
    /// The client call failed; the failure has been counted
    Failed,
    /// The client does not implement this call shape (bulk on a
    /// single-only client); nothing was counted
    Unsupported,
}

/// One benchable operation against the store
///
/// `process` receives the key batch drawn by the worker (a single key in
/// non-bulk mode) and performs exactly one monitor event regardless of the
/// batch size.
pub trait BenchOperation: Send + Sync {
    fn kind(&self) -> OpKind;

    fn process(
        &self,
        keys: &[String],
        monitor: &dyn Monitor,
        limiter: &RateLimiter,
        auto_tune: bool,
    ) -> OpStatus;
}

/// Applies an auto-tune suggestion: `rate > 0` and different from the
/// limiter's current rate wins; anything else is "no change".
fn apply_tuned_rate(suggestion: Result<f64, BenchError>, limiter: &RateLimiter, kind: OpKind) {
    match suggestion {
        Ok(rate) => {
            if rate > 0.0 && rate != limiter.rate() {
                debug!(?kind, rate, "auto-tune adjusting rate limit");
                limiter.set_rate(rate);
            }
        }
        Err(BenchError::Unsupported(_)) => {}
        Err(e) => error!(?kind, %e, "auto-tune hook failed"),
    }
}

/// Reads one key, or a batch of keys in bulk mode
///
/// A read returning no value (or an empty one) is a cache miss, counted as
/// both a miss and a success; only a client error counts as a failure. A
/// bulk read is a hit when *any* key in the batch came back with a value.
///
/// Bulk mode is fixed at construction: a bulk operation always uses the
/// client's bulk call, even when key deduplication shrinks a batch to one.
pub struct ReadOperation {
    client: Arc<dyn Client>,
    bulk: bool,
}

impl ReadOperation {
    pub fn new(client: Arc<dyn Client>, bulk: bool) -> Self {
        ReadOperation { client, bulk }
    }

    fn record_hit_or_miss(&self, hit: bool, monitor: &dyn Monitor) {
        if hit {
            monitor.inc_cache_hit();
        } else {
            monitor.inc_cache_miss();
        }
        monitor.inc_read_success();
    }
}

impl BenchOperation for ReadOperation {
    fn kind(&self) -> OpKind {
        OpKind::Read
    }

    fn process(
        &self,
        keys: &[String],
        monitor: &dyn Monitor,
        limiter: &RateLimiter,
        auto_tune: bool,
    ) -> OpStatus {
        let start = Instant::now();
        let outcome = if self.bulk {
            self.client
                .read_bulk(keys)
                .map(|values| values.iter().any(|v| v.as_deref().is_some_and(|s| !s.is_empty())))
        } else {
            self.client
                .read_single(&keys[0])
                .map(|value| value.as_deref().is_some_and(|s| !s.is_empty()))
        };
        let micros = start.elapsed().as_micros().min(u128::from(u64::MAX)) as u64;

        match outcome {
            Ok(hit) => {
                monitor.record_read_latency(micros);
                self.record_hit_or_miss(hit, monitor);
                if auto_tune {
                    apply_tuned_rate(
                        self.client.auto_tune_read_rate_limit(limiter.rate(), monitor),
                        limiter,
                        self.kind(),
                    );
                }
                OpStatus::Completed
            }
            Err(BenchError::Unsupported(_)) => OpStatus::Unsupported,
            Err(e) => {
                error!(key = %keys[0], %e, "read operation failed");
                monitor.inc_read_failure();
                OpStatus::Failed
            }
        }
    }
}

/// Writes one key, or a batch of keys in bulk mode
pub struct WriteOperation {
    client: Arc<dyn Client>,
    bulk: bool,
}

impl WriteOperation {
    pub fn new(client: Arc<dyn Client>, bulk: bool) -> Self {
        WriteOperation { client, bulk }
    }
}

impl BenchOperation for WriteOperation {
    fn kind(&self) -> OpKind {
        OpKind::Write
    }

    fn process(
        &self,
        keys: &[String],
        monitor: &dyn Monitor,
        limiter: &RateLimiter,
        auto_tune: bool,
    ) -> OpStatus {
        let start = Instant::now();
        let outcome = if self.bulk {
            self.client
                .write_bulk(keys)
                .map(|results| results.into_iter().next_back().unwrap_or_default())
        } else {
            self.client.write_single(&keys[0])
        };
        let micros = start.elapsed().as_micros().min(u128::from(u64::MAX)) as u64;

        match outcome {
            Ok(result) => {
                monitor.record_write_latency(micros);
                monitor.inc_write_success();
                if auto_tune {
                    apply_tuned_rate(
                        self.client
                            .auto_tune_write_rate_limit(limiter.rate(), &result, monitor),
                        limiter,
                        self.kind(),
                    );
                }
                OpStatus::Completed
            }
            Err(BenchError::Unsupported(_)) => OpStatus::Unsupported,
            Err(e) => {
                error!(key = %keys[0], %e, "write operation failed");
                monitor.inc_write_failure();
                OpStatus::Failed
            }
        }
    }
}
