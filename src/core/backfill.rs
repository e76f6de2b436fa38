//! Parallel pre-population of the key space
//!
//! A benchmark against a cold store reads nothing but misses. [`Backfill`]
//! fixes that by writing the whole key space through the client before the
//! run: the range `start_key..num_keys` is partitioned into contiguous
//! slices, one per thread, and each thread walks its slice writing `T{k}`
//! keys. Failed writes are retried in place, so a finished backfill covers
//! every key; a cooperative stop flag lets the operator abandon one early.
//!
//! Three modes exist: [`Write`](BackfillMode::Write) writes every key,
//! [`WriteMissing`](BackfillMode::WriteMissing) reads first and only fills
//! holes, and [`Verify`](BackfillMode::Verify) writes then reads back,
//! counting keys the store failed to return.

use crate::client::Client;
use crate::core::BenchError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// What each backfill thread does per key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillMode {
    /// Write every key unconditionally
    Write,
    /// Read first; write only keys the store has no value for
    WriteMissing,
    /// Write, then read back; a key that comes back empty counts as a miss
    Verify,
}

/// Parameters for one backfill pass
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    pub num_threads: usize,
    /// First key index to fill; lets a resumed backfill skip finished work
    pub start_key: u64,
    /// End of the key space (exclusive), matching the run's `num_keys`
    pub num_keys: u64,
    /// How often the progress line is logged
    pub progress_interval: Duration,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        BackfillConfig {
            num_threads: 4,
            start_key: 0,
            num_keys: 1000,
            progress_interval: Duration::from_secs(5),
        }
    }
}

/// Fills the key space through a client from a pool of writer threads
///
/// Reusable: after a pass finishes (or is stopped) the same instance can
/// start another one. Only one pass runs at a time.
pub struct Backfill {
    config: BackfillConfig,
    stop: Arc<AtomicBool>,
    filled: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    /// Writer threads still walking their slice
    pending: Arc<AtomicU64>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Backfill {
    pub fn new(config: BackfillConfig) -> Self {
        Backfill {
            config,
            stop: Arc::new(AtomicBool::new(false)),
            filled: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            pending: Arc::new(AtomicU64::new(0)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Run a full pass and block until it finishes
    pub fn run(&self, client: Arc<dyn Client>, mode: BackfillMode) -> Result<(), BenchError> {
        let started = Instant::now();
        self.start(client, mode)?;
        let filled = self.wait();
        info!(
            filled,
            misses = self.misses(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "backfill finished"
        );
        Ok(())
    }

    /// Launch a pass in the background; pair with [`wait`](Backfill::wait)
    pub fn start(&self, client: Arc<dyn Client>, mode: BackfillMode) -> Result<(), BenchError> {
        let mut workers = self.workers.lock();
        if self.pending.load(Ordering::Relaxed) > 0 {
            return Err(BenchError::State("backfill already running".to_string()));
        }
        // A finished-but-unwaited pass leaves joinable handles behind
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                error!("backfill thread panicked");
            }
        }

        if self.config.num_threads == 0 || self.config.start_key >= self.config.num_keys {
            return Err(BenchError::Initialization(format!(
                "cannot backfill keys {}..{} with {} threads",
                self.config.start_key, self.config.num_keys, self.config.num_threads
            )));
        }

        self.stop.store(false, Ordering::Relaxed);
        self.filled.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);

        let total = self.config.num_keys - self.config.start_key;
        let threads = (self.config.num_threads as u64).min(total);
        let keys_per_thread = total / threads;
        info!(
            ?mode,
            threads,
            keys = total,
            keys_per_thread,
            "starting backfill"
        );

        self.pending.store(threads, Ordering::Relaxed);
        for i in 0..threads {
            let start = self.config.start_key + i * keys_per_thread;
            // The last slice absorbs the division remainder
            let end = if i == threads - 1 {
                self.config.num_keys
            } else {
                start + keys_per_thread
            };
            let client = Arc::clone(&client);
            let stop = Arc::clone(&self.stop);
            let filled = Arc::clone(&self.filled);
            let misses = Arc::clone(&self.misses);
            let pending = Arc::clone(&self.pending);
            let handle = thread::Builder::new()
                .name(format!("loadcrab-backfill-{i}"))
                .spawn(move || {
                    fill_range(client.as_ref(), mode, start, end, &stop, &filled, &misses);
                    pending.fetch_sub(1, Ordering::Relaxed);
                })
                .map_err(|e| {
                    BenchError::Initialization(format!("failed to spawn backfill thread: {e}"))
                })?;
            workers.push(handle);
        }

        let progress = {
            let stop = Arc::clone(&self.stop);
            let filled = Arc::clone(&self.filled);
            let misses = Arc::clone(&self.misses);
            let pending = Arc::clone(&self.pending);
            let interval = self.config.progress_interval;
            thread::Builder::new()
                .name("loadcrab-backfill-progress".to_string())
                .spawn(move || {
                    while pending.load(Ordering::Relaxed) > 0 && !stop.load(Ordering::Relaxed) {
                        info!(
                            filled = filled.load(Ordering::Relaxed),
                            misses = misses.load(Ordering::Relaxed),
                            "backfill progress"
                        );
                        let deadline = Instant::now() + interval;
                        while Instant::now() < deadline
                            && pending.load(Ordering::Relaxed) > 0
                            && !stop.load(Ordering::Relaxed)
                        {
                            thread::sleep(Duration::from_millis(20).min(interval));
                        }
                    }
                })
                .map_err(|e| {
                    BenchError::Initialization(format!(
                        "failed to spawn backfill progress thread: {e}"
                    ))
                })?
        };
        workers.push(progress);
        Ok(())
    }

    /// Block until the current pass finishes; returns the number of keys
    /// processed
    pub fn wait(&self) -> u64 {
        for handle in self.workers.lock().drain(..) {
            if handle.join().is_err() {
                error!("backfill thread panicked");
            }
        }
        self.filled.load(Ordering::Relaxed)
    }

    /// Ask the current pass to stop after each thread's in-flight key
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.pending.load(Ordering::Relaxed) > 0
    }

    /// Keys processed by the current or most recent pass
    pub fn keys_filled(&self) -> u64 {
        self.filled.load(Ordering::Relaxed)
    }

    /// Keys found absent ([`WriteMissing`](BackfillMode::WriteMissing)) or
    /// unreadable after write ([`Verify`](BackfillMode::Verify))
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

fn fill_range(
    client: &dyn Client,
    mode: BackfillMode,
    start: u64,
    end: u64,
    stop: &AtomicBool,
    filled: &AtomicU64,
    misses: &AtomicU64,
) {
    let mut k = start;
    while k < end && !stop.load(Ordering::Relaxed) {
        let key = format!("T{k}");
        match fill_one(client, mode, &key, misses) {
            Ok(()) => {
                k += 1;
                filled.fetch_add(1, Ordering::Relaxed);
            }
            // Retry the same key; a persistent failure is visible in the
            // stalled progress line and stoppable via the flag
            Err(e) => error!(key = %key, %e, "backfill write failed, retrying"),
        }
    }
}

fn fill_one(
    client: &dyn Client,
    mode: BackfillMode,
    key: &str,
    misses: &AtomicU64,
) -> Result<(), BenchError> {
    match mode {
        BackfillMode::Write => {
            client.write_single(key)?;
        }
        BackfillMode::WriteMissing => {
            if client.read_single(key)?.is_none() {
                misses.fetch_add(1, Ordering::Relaxed);
                client.write_single(key)?;
            }
        }
        BackfillMode::Verify => {
            client.write_single(key)?;
            if client.read_single(key)?.is_none() {
                misses.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    Ok(())
}
