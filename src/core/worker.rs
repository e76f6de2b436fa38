//! Dynamically resizable worker pools
//!
//! A [`WorkerPool`] owns the threads driving one operation direction. Each
//! worker runs the same loop: draw keys, wait for a rate-limiter permit,
//! execute the operation, check for cancellation. Workers are cooperative:
//! they observe stop flags between operations and never abort a client call
//! mid-flight, so joining the pool guarantees no operation is still running.
//!
//! Resizing never reuses a worker slot. Scaling down flips per-worker
//! `active` flags and moves the handles to a retired list; scaling up spawns
//! fresh threads with fresh indices. This keeps "which workers are live"
//! trivially correct under repeated up/down resizes.

use crate::core::{BenchOperation, Monitor, OpStatus, RateLimiter};
use crate::generators::KeyGenerator;
use ahash::AHashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Everything one worker thread needs, shared across the whole pool
pub struct WorkerContext {
    pub operation: Arc<dyn BenchOperation>,
    pub key_generator: Arc<dyn KeyGenerator>,
    pub limiter: Arc<RateLimiter>,
    pub monitor: Arc<dyn Monitor>,
    pub auto_tune: bool,
    /// Keys per operation; > 1 switches the client calls to their bulk form
    pub bulk_size: usize,
}

/// Shared cancellation state for one pool
struct PoolState {
    /// Pool-wide stop; set by `request_stop`, by key exhaustion, or when
    /// the client turns out not to support the configured bulk mode
    stop: AtomicBool,
    /// Ensures the unsupported-bulk condition is logged once, not once
    /// per worker
    unsupported_reported: AtomicBool,
}

struct WorkerSlot {
    /// Per-worker liveness; cleared to retire this worker during scale-down
    active: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// A named pool of worker threads executing one operation
pub struct WorkerPool {
    name: String,
    ctx: Arc<WorkerContext>,
    state: Arc<PoolState>,
    slots: Vec<WorkerSlot>,
    retired: Vec<JoinHandle<()>>,
    /// Monotonic worker index; never reused across resizes
    next_index: AtomicUsize,
}

impl WorkerPool {
    /// Spawn `count` workers running `ctx.operation`
    ///
    /// `name` distinguishes the pool in thread names and logs
    /// ("reads"/"writes").
    pub fn spawn(
        name: &str,
        ctx: WorkerContext,
        count: usize,
    ) -> Result<Self, crate::core::BenchError> {
        let mut pool = WorkerPool {
            name: name.to_string(),
            ctx: Arc::new(ctx),
            state: Arc::new(PoolState {
                stop: AtomicBool::new(false),
                unsupported_reported: AtomicBool::new(false),
            }),
            slots: Vec::with_capacity(count),
            retired: Vec::new(),
            next_index: AtomicUsize::new(0),
        };
        for _ in 0..count {
            pool.spawn_one()?;
        }
        info!(pool = %pool.name, workers = count, "worker pool started");
        Ok(pool)
    }

    fn spawn_one(&mut self) -> Result<(), crate::core::BenchError> {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        let ctx = Arc::clone(&self.ctx);
        let state = Arc::clone(&self.state);
        let pool_name = self.name.clone();
        let worker_active = Arc::clone(&active);
        let handle = thread::Builder::new()
            .name(format!("loadcrab-{}-{}", self.name, index))
            .spawn(move || worker_loop(&pool_name, &ctx, &state, &worker_active))
            .map_err(|e| {
                crate::core::BenchError::Initialization(format!(
                    "failed to spawn worker thread: {e}"
                ))
            })?;
        self.slots.push(WorkerSlot { active, handle });
        Ok(())
    }

    /// Number of workers currently live
    pub fn worker_count(&self) -> usize {
        self.slots.len()
    }

    /// Grow or shrink the pool to `count` workers
    ///
    /// Shrinking is graceful: retired workers finish their in-flight
    /// operation and exit at the next loop check. Their handles are reaped
    /// opportunistically here and finally in [`join`](WorkerPool::join).
    pub fn resize(&mut self, count: usize) -> Result<(), crate::core::BenchError> {
        // Reap retired threads that have since exited
        self.retired.retain(|h| !h.is_finished());

        while self.slots.len() > count {
            if let Some(slot) = self.slots.pop() {
                slot.active.store(false, Ordering::Relaxed);
                self.retired.push(slot.handle);
            }
        }
        while self.slots.len() < count {
            self.spawn_one()?;
        }
        info!(pool = %self.name, workers = count, "worker pool resized");
        Ok(())
    }

    /// Ask every worker to stop after its current operation
    pub fn request_stop(&self) {
        self.state.stop.store(true, Ordering::Relaxed);
    }

    /// Whether the pool has stopped itself (key exhaustion, unsupported
    /// bulk mode) or been asked to stop
    pub fn is_stopping(&self) -> bool {
        self.state.stop.load(Ordering::Relaxed)
    }

    /// Wait up to `timeout` for every worker (including retired ones) to exit
    ///
    /// Returns the number of workers that failed to exit in time; those are
    /// detached and logged, never blocked on forever. Call
    /// [`request_stop`](WorkerPool::request_stop) first.
    pub fn join(mut self, timeout: Duration) -> usize {
        self.state.stop.store(true, Ordering::Relaxed);
        let deadline = Instant::now() + timeout;
        let mut handles: Vec<JoinHandle<()>> = self
            .slots
            .drain(..)
            .map(|slot| slot.handle)
            .chain(self.retired.drain(..))
            .collect();

        while !handles.is_empty() && Instant::now() < deadline {
            handles.retain(|h| !h.is_finished());
            if handles.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        let mut stragglers = 0;
        for handle in handles {
            if handle.is_finished() {
                if handle.join().is_err() {
                    error!(pool = %self.name, "worker thread panicked");
                }
            } else {
                stragglers += 1;
            }
        }
        if stragglers > 0 {
            warn!(
                pool = %self.name,
                stragglers,
                "workers still running at join timeout; detaching"
            );
        } else {
            info!(pool = %self.name, "worker pool joined");
        }
        stragglers
    }
}

/// Draw `bulk_size` distinct keys, or fewer if the stream stops repeating
///
/// The attempt cap keeps a tiny key space from spinning forever; a batch
/// with duplicates removed is acceptable.
fn draw_keys(ctx: &WorkerContext) -> Option<Vec<String>> {
    if !ctx.key_generator.has_next_key() {
        return None;
    }
    if ctx.bulk_size <= 1 {
        return Some(vec![ctx.key_generator.next_key()]);
    }
    let mut seen = AHashSet::with_capacity(ctx.bulk_size);
    let mut keys = Vec::with_capacity(ctx.bulk_size);
    let mut attempts = 0;
    while keys.len() < ctx.bulk_size && attempts < ctx.bulk_size * 10 {
        let key = ctx.key_generator.next_key();
        if seen.insert(key.clone()) {
            keys.push(key);
        }
        attempts += 1;
    }
    Some(keys)
}

fn worker_loop(
    pool_name: &str,
    ctx: &WorkerContext,
    state: &PoolState,
    active: &AtomicBool,
) {
    while active.load(Ordering::Relaxed) && !state.stop.load(Ordering::Relaxed) {
        let Some(keys) = draw_keys(ctx) else {
            // Stream exhausted: this side of the run is finished
            if !state.stop.swap(true, Ordering::Relaxed) {
                info!(pool = %pool_name, "key stream exhausted, stopping pool");
            }
            break;
        };

        ctx.limiter.acquire();

        // Re-check after a potentially long sleep in the limiter
        if !active.load(Ordering::Relaxed) || state.stop.load(Ordering::Relaxed) {
            break;
        }

        let status = ctx
            .operation
            .process(&keys, ctx.monitor.as_ref(), &ctx.limiter, ctx.auto_tune);

        if status == OpStatus::Unsupported {
            // Configuration mismatch, not a transient failure: the client
            // cannot serve the configured call shape, so retrying is noise.
            if !state.unsupported_reported.swap(true, Ordering::Relaxed) {
                error!(
                    pool = %pool_name,
                    bulk_size = ctx.bulk_size,
                    "client does not support the configured operation shape; stopping pool"
                );
            }
            state.stop.store(true, Ordering::Relaxed);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BenchError, CoreMonitor, OpKind};
    use std::sync::atomic::AtomicU64;

    /// Operation that counts calls and tracks concurrent executions
    struct CountingOperation {
        calls: AtomicU64,
        in_flight: AtomicU64,
        max_in_flight: AtomicU64,
        delay: Duration,
        unsupported: bool,
    }

    impl CountingOperation {
        fn new(delay: Duration) -> Self {
            CountingOperation {
                calls: AtomicU64::new(0),
                in_flight: AtomicU64::new(0),
                max_in_flight: AtomicU64::new(0),
                delay,
                unsupported: false,
            }
        }
    }

    impl BenchOperation for CountingOperation {
        fn kind(&self) -> OpKind {
            OpKind::Read
        }

        fn process(
            &self,
            _keys: &[String],
            monitor: &dyn Monitor,
            _limiter: &RateLimiter,
            _auto_tune: bool,
        ) -> OpStatus {
            if self.unsupported {
                return OpStatus::Unsupported;
            }
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            monitor.inc_read_success();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            OpStatus::Completed
        }
    }

    struct EndlessKeys;

    impl KeyGenerator for EndlessKeys {
        fn next_key(&self) -> String {
            "T0".to_string()
        }
    }

    struct FiniteKeys {
        remaining: AtomicU64,
    }

    impl KeyGenerator for FiniteKeys {
        fn next_key(&self) -> String {
            self.remaining.fetch_sub(1, Ordering::SeqCst);
            "T0".to_string()
        }

        fn has_next_key(&self) -> bool {
            self.remaining.load(Ordering::SeqCst) > 0
        }
    }

    fn context(operation: Arc<dyn BenchOperation>, keys: Arc<dyn KeyGenerator>) -> WorkerContext {
        WorkerContext {
            operation,
            key_generator: keys,
            limiter: Arc::new(RateLimiter::new(0.0)),
            monitor: Arc::new(CoreMonitor::new()),
            auto_tune: false,
            bulk_size: 1,
        }
    }

    #[test]
    fn workers_execute_and_stop_cleanly() {
        let op = Arc::new(CountingOperation::new(Duration::ZERO));
        let ctx = context(Arc::clone(&op) as _, Arc::new(EndlessKeys));
        let pool = WorkerPool::spawn("reads", ctx, 4).unwrap();
        thread::sleep(Duration::from_millis(50));
        pool.request_stop();
        assert_eq!(pool.join(Duration::from_secs(2)), 0);
        assert!(op.calls.load(Ordering::SeqCst) > 0);
        // No operation may still be running after a clean join
        assert_eq!(op.in_flight.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn resize_up_and_down_is_safe() {
        let op = Arc::new(CountingOperation::new(Duration::from_millis(1)));
        let ctx = context(Arc::clone(&op) as _, Arc::new(EndlessKeys));
        let mut pool = WorkerPool::spawn("reads", ctx, 8).unwrap();
        thread::sleep(Duration::from_millis(30));

        pool.resize(2).unwrap();
        assert_eq!(pool.worker_count(), 2);
        thread::sleep(Duration::from_millis(30));

        pool.resize(6).unwrap();
        assert_eq!(pool.worker_count(), 6);
        thread::sleep(Duration::from_millis(30));

        pool.request_stop();
        assert_eq!(pool.join(Duration::from_secs(2)), 0);
        assert_eq!(op.in_flight.load(Ordering::SeqCst), 0);
        assert!(op.max_in_flight.load(Ordering::SeqCst) <= 8);
    }

    #[test]
    fn key_exhaustion_stops_the_pool() {
        let op = Arc::new(CountingOperation::new(Duration::ZERO));
        let ctx = context(
            Arc::clone(&op) as _,
            Arc::new(FiniteKeys {
                remaining: AtomicU64::new(100),
            }),
        );
        let pool = WorkerPool::spawn("writes", ctx, 2).unwrap();
        // Workers notice exhaustion on their own, without request_stop
        let deadline = Instant::now() + Duration::from_secs(2);
        while !pool.is_stopping() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(pool.is_stopping());
        assert_eq!(pool.join(Duration::from_secs(2)), 0);
    }

    #[test]
    fn unsupported_operation_stops_the_pool() {
        let op = Arc::new(CountingOperation {
            unsupported: true,
            ..CountingOperation::new(Duration::ZERO)
        });
        let mut ctx = context(Arc::clone(&op) as _, Arc::new(EndlessKeys));
        ctx.bulk_size = 5;
        let pool = WorkerPool::spawn("reads", ctx, 3).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !pool.is_stopping() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(pool.is_stopping());
        assert_eq!(pool.join(Duration::from_secs(2)), 0);
        assert_eq!(op.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn bulk_batches_deduplicate_keys() {
        struct TwoKeys {
            toggle: AtomicU64,
        }
        impl KeyGenerator for TwoKeys {
            fn next_key(&self) -> String {
                format!("T{}", self.toggle.fetch_add(1, Ordering::Relaxed) % 2)
            }
        }
        let ctx = WorkerContext {
            operation: Arc::new(CountingOperation::new(Duration::ZERO)),
            key_generator: Arc::new(TwoKeys {
                toggle: AtomicU64::new(0),
            }),
            limiter: Arc::new(RateLimiter::new(0.0)),
            monitor: Arc::new(CoreMonitor::new()),
            auto_tune: false,
            bulk_size: 5,
        };
        let keys = draw_keys(&ctx).unwrap();
        // Only two distinct keys exist; the attempt cap ends the draw
        assert_eq!(keys.len(), 2);
        assert_ne!(keys[0], keys[1]);
    }
}
