//! The benchmark run orchestrator
//!
//! [`Driver`] owns the full lifecycle of a run: it binds a [`Client`] to the
//! data generator, builds the key streams, spawns the read and write
//! [`WorkerPool`]s, runs the ramp-control and reporting loops on background
//! threads, and tears everything down in order on [`stop`](Driver::stop).
//!
//! The lifecycle is a strict state machine:
//!
//! ```text
//! Stopped --start--> Starting --ok--> Running --stop--> Stopping --> Stopped
//!                        \--error--> Stopped
//! ```
//!
//! Rate and worker-count updates are accepted while running and take effect
//! without restarting the run.

use crate::client::{Client, DataGenerator};
use crate::core::{
    BenchError, LoadPattern, Monitor, RampSchedule, RateLimiter, ReadOperation, RpsTracker,
    WorkerPool, WriteOperation,
};
use crate::core::worker::WorkerContext;
use crate::generators::{KeyDistribution, KeyStreamConfig, create_key_generator};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Where the driver is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Stopped => write!(f, "stopped"),
            RunState::Starting => write!(f, "starting"),
            RunState::Running => write!(f, "running"),
            RunState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Static configuration for a run; everything else arrives via
/// [`Driver::start`] or the runtime update methods
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub num_readers: usize,
    pub num_writers: usize,
    pub read_enabled: bool,
    pub write_enabled: bool,
    /// Target read rate in operations per second; `<= 0` disables limiting
    pub read_rate_limit: f64,
    /// Target write rate in operations per second; `<= 0` disables limiting
    pub write_rate_limit: f64,
    /// Let the client steer the rate limiters from its own feedback
    pub auto_tune: bool,
    pub key_distribution: KeyDistribution,
    /// Size of the key space; keys are `T0 .. T{num_keys-1}`
    pub num_keys: u64,
    /// Exponent for [`KeyDistribution::Zipfian`]
    pub zipf_exponent: f64,
    /// Materialize every key string when a run starts
    pub preload_keys: bool,
    /// How often the throughput reporter ticks
    pub stats_update_interval: Duration,
    /// Periodically zero the monitor mid-run; `None` disables
    pub stats_reset_interval: Option<Duration>,
    /// How long `stop` waits for workers before detaching them
    pub join_timeout: Duration,
    /// Zero the monitor when a run stops
    pub reset_stats_on_stop: bool,
    /// Fixed seed for reproducible key streams
    pub seed: Option<u64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            num_readers: 4,
            num_writers: 4,
            read_enabled: true,
            write_enabled: true,
            read_rate_limit: 1000.0,
            write_rate_limit: 1000.0,
            auto_tune: false,
            key_distribution: KeyDistribution::Random,
            num_keys: 1000,
            zipf_exponent: 1.0,
            preload_keys: false,
            stats_update_interval: Duration::from_secs(5),
            stats_reset_interval: None,
            join_timeout: Duration::from_secs(5),
            reset_stats_on_stop: true,
            seed: None,
        }
    }
}

#[derive(Default)]
struct PoolPair {
    read: Option<WorkerPool>,
    write: Option<WorkerPool>,
}

/// Orchestrates worker pools, rate control, and reporting for one client
pub struct Driver {
    config: DriverConfig,
    monitor: Arc<dyn Monitor>,
    data_generator: Arc<dyn DataGenerator>,
    read_limiter: Arc<RateLimiter>,
    write_limiter: Arc<RateLimiter>,
    client: Mutex<Option<Arc<dyn Client>>>,
    state: Mutex<RunState>,
    pools: Arc<Mutex<PoolPair>>,
    aux_threads: Mutex<Vec<JoinHandle<()>>>,
    aux_stop: Arc<AtomicBool>,
}

impl Driver {
    /// Assemble a driver from its collaborators
    ///
    /// The limiters are injected rather than built internally so that
    /// external control surfaces can share them; their initial rates are
    /// overwritten from `config` during [`init`](Driver::init).
    pub fn new(
        config: DriverConfig,
        monitor: Arc<dyn Monitor>,
        data_generator: Arc<dyn DataGenerator>,
        read_limiter: Arc<RateLimiter>,
        write_limiter: Arc<RateLimiter>,
    ) -> Self {
        Driver {
            config,
            monitor,
            data_generator,
            read_limiter,
            write_limiter,
            client: Mutex::new(None),
            state: Mutex::new(RunState::Stopped),
            pools: Arc::new(Mutex::new(PoolPair::default())),
            aux_threads: Mutex::new(Vec::new()),
            aux_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bind and initialize the backend client
    ///
    /// Must be called exactly once before [`start`](Driver::start); a second
    /// call or a client that fails its own `init` is an error.
    pub fn init(&self, mut client: Box<dyn Client>) -> Result<(), BenchError> {
        let mut slot = self.client.lock();
        if slot.is_some() {
            return Err(BenchError::Initialization(
                "driver already holds an initialized client".to_string(),
            ));
        }
        client.init(Arc::clone(&self.data_generator))?;
        info!(connection = %client.connection_info(), "client initialized");
        self.read_limiter.set_rate(self.config.read_rate_limit);
        self.write_limiter.set_rate(self.config.write_rate_limit);
        *slot = Some(Arc::from(client));
        Ok(())
    }

    /// Start a run shaped by `pattern`
    ///
    /// `window_size` and `window_duration` parameterize both the ramp
    /// schedule (step count and step length) and the sliding-window key
    /// distributions (window width and dwell/run time). `bulk_size > 1`
    /// switches workers to the client's bulk calls.
    pub fn start(
        &self,
        pattern: LoadPattern,
        window_size: u32,
        window_duration: Duration,
        bulk_size: usize,
    ) -> Result<(), BenchError> {
        {
            let mut state = self.state.lock();
            if *state != RunState::Stopped {
                return Err(BenchError::State(format!(
                    "cannot start while {state}"
                )));
            }
            *state = RunState::Starting;
        }

        match self.start_inner(pattern, window_size, window_duration, bulk_size) {
            Ok(()) => {
                *self.state.lock() = RunState::Running;
                info!(%pattern, bulk_size, "benchmark run started");
                Ok(())
            }
            Err(e) => {
                error!(%e, "run startup failed; rolling back");
                self.teardown();
                *self.state.lock() = RunState::Stopped;
                Err(e)
            }
        }
    }

    fn start_inner(
        &self,
        pattern: LoadPattern,
        window_size: u32,
        window_duration: Duration,
        bulk_size: usize,
    ) -> Result<(), BenchError> {
        let client = self
            .client
            .lock()
            .clone()
            .ok_or_else(|| BenchError::Initialization("no client initialized".to_string()))?;

        if bulk_size == 0 {
            return Err(BenchError::Initialization(
                "bulk_size must be >= 1".to_string(),
            ));
        }

        self.aux_stop.store(false, Ordering::Relaxed);

        let key_stream = KeyStreamConfig {
            distribution: self.config.key_distribution,
            num_keys: self.config.num_keys,
            window_size: u64::from(window_size.max(1)),
            window_duration,
            zipf_exponent: self.config.zipf_exponent,
            preload_keys: self.config.preload_keys,
            seed: self.config.seed,
        };

        // Ramp schedules shape each direction toward its configured rate.
        // Unlimited directions (rate <= 0) are never ramped.
        let read_schedule = self.schedule_for(
            pattern,
            self.config.read_rate_limit,
            window_size,
            window_duration,
        )?;
        let write_schedule = self.schedule_for(
            pattern,
            self.config.write_rate_limit,
            window_size,
            window_duration,
        )?;
        // A fresh run always starts from its configured rates, even if a
        // previous run stopped mid-ramp
        match &read_schedule {
            Some(schedule) => self.read_limiter.set_rate(ramp_rate(schedule, Duration::ZERO)),
            None => self.read_limiter.set_rate(self.config.read_rate_limit),
        }
        match &write_schedule {
            Some(schedule) => self.write_limiter.set_rate(ramp_rate(schedule, Duration::ZERO)),
            None => self.write_limiter.set_rate(self.config.write_rate_limit),
        }

        // Writers first so reads have data to find on a cold store
        let mut pools = self.pools.lock();
        if self.config.write_enabled && self.config.num_writers > 0 {
            let ctx = WorkerContext {
                operation: Arc::new(WriteOperation::new(Arc::clone(&client), bulk_size > 1)),
                key_generator: Arc::from(create_key_generator(&key_stream)?),
                limiter: Arc::clone(&self.write_limiter),
                monitor: Arc::clone(&self.monitor),
                auto_tune: self.config.auto_tune,
                bulk_size,
            };
            pools.write = Some(WorkerPool::spawn("writes", ctx, self.config.num_writers)?);
        }
        if self.config.read_enabled && self.config.num_readers > 0 {
            let ctx = WorkerContext {
                operation: Arc::new(ReadOperation::new(Arc::clone(&client), bulk_size > 1)),
                key_generator: Arc::from(create_key_generator(&key_stream)?),
                limiter: Arc::clone(&self.read_limiter),
                monitor: Arc::clone(&self.monitor),
                auto_tune: self.config.auto_tune,
                bulk_size,
            };
            pools.read = Some(WorkerPool::spawn("reads", ctx, self.config.num_readers)?);
        }
        drop(pools);

        let mut aux = self.aux_threads.lock();
        if read_schedule.is_some() || write_schedule.is_some() {
            aux.push(self.spawn_ramp_thread(
                read_schedule,
                write_schedule,
                window_duration,
            )?);
        }
        aux.push(self.spawn_reporter_thread()?);
        Ok(())
    }

    fn schedule_for(
        &self,
        pattern: LoadPattern,
        rate: f64,
        window_size: u32,
        window_duration: Duration,
    ) -> Result<Option<RampSchedule>, BenchError> {
        if pattern == LoadPattern::Flat || rate <= 0.0 {
            return Ok(None);
        }
        RampSchedule::for_pattern(pattern, rate, window_size.max(1), window_duration).map(Some)
    }

    fn spawn_ramp_thread(
        &self,
        read_schedule: Option<RampSchedule>,
        write_schedule: Option<RampSchedule>,
        step_duration: Duration,
    ) -> Result<JoinHandle<()>, BenchError> {
        let read_limiter = Arc::clone(&self.read_limiter);
        let write_limiter = Arc::clone(&self.write_limiter);
        let stop = Arc::clone(&self.aux_stop);
        // Tick fast enough to land close to step boundaries
        let tick = (step_duration / 4).clamp(Duration::from_millis(10), Duration::from_secs(1));
        thread::Builder::new()
            .name("loadcrab-ramp".to_string())
            .spawn(move || {
                let start = Instant::now();
                while !stop.load(Ordering::Relaxed) {
                    let elapsed = start.elapsed();
                    let mut all_final = true;
                    for (schedule, limiter) in [
                        (&read_schedule, &read_limiter),
                        (&write_schedule, &write_limiter),
                    ] {
                        if let Some(schedule) = schedule {
                            let target = ramp_rate(schedule, elapsed);
                            if target != limiter.rate() {
                                info!(rate = target, "ramp advancing rate limit");
                                limiter.set_rate(target);
                            }
                            all_final &= schedule.is_final(elapsed);
                        }
                    }
                    if all_final {
                        info!("ramp complete");
                        break;
                    }
                    thread::sleep(tick);
                }
            })
            .map_err(|e| BenchError::Initialization(format!("failed to spawn ramp thread: {e}")))
    }

    fn spawn_reporter_thread(&self) -> Result<JoinHandle<()>, BenchError> {
        let monitor = Arc::clone(&self.monitor);
        let read_limiter = Arc::clone(&self.read_limiter);
        let write_limiter = Arc::clone(&self.write_limiter);
        let pools = Arc::clone(&self.pools);
        let stop = Arc::clone(&self.aux_stop);
        let interval = self.config.stats_update_interval;
        let reset_interval = self.config.stats_reset_interval;
        thread::Builder::new()
            .name("loadcrab-stats".to_string())
            .spawn(move || {
                let mut tracker = RpsTracker::new();
                let mut last_reset = Instant::now();
                while !stop.load(Ordering::Relaxed) {
                    // Sleep in small slices so stop is observed promptly
                    let deadline = Instant::now() + interval;
                    while Instant::now() < deadline && !stop.load(Ordering::Relaxed) {
                        thread::sleep(Duration::from_millis(50).min(interval));
                    }
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    let (reads_running, writes_running) = {
                        let pools = pools.lock();
                        (
                            pools.read.as_ref().is_some_and(|p| !p.is_stopping()),
                            pools.write.as_ref().is_some_and(|p| !p.is_stopping()),
                        )
                    };
                    tracker.update(
                        monitor.as_ref(),
                        &read_limiter,
                        &write_limiter,
                        reads_running,
                        writes_running,
                    );
                    if let Some(reset_after) = reset_interval
                        && last_reset.elapsed() >= reset_after
                    {
                        info!("periodic stats reset");
                        monitor.reset_stats();
                        last_reset = Instant::now();
                    }
                }
            })
            .map_err(|e| {
                BenchError::Initialization(format!("failed to spawn reporter thread: {e}"))
            })
    }

    /// Stop the current run
    ///
    /// Cancellation is cooperative: workers finish their in-flight operation
    /// and exit, bounded by the configured join timeout. Workers that fail to
    /// exit in time are detached with a warning rather than blocking shutdown.
    pub fn stop(&self) -> Result<(), BenchError> {
        {
            let mut state = self.state.lock();
            if *state != RunState::Running {
                return Err(BenchError::State(format!("cannot stop while {state}")));
            }
            *state = RunState::Stopping;
        }

        self.teardown();

        if self.config.reset_stats_on_stop {
            self.monitor.reset_stats();
        }
        *self.state.lock() = RunState::Stopped;
        info!("benchmark run stopped");
        Ok(())
    }

    /// Stop auxiliary threads and worker pools; safe to call on a partially
    /// started run
    fn teardown(&self) {
        self.aux_stop.store(true, Ordering::Relaxed);

        let (read, write) = {
            let mut pools = self.pools.lock();
            (pools.read.take(), pools.write.take())
        };
        if let Some(pool) = &read {
            pool.request_stop();
        }
        if let Some(pool) = &write {
            pool.request_stop();
        }
        let mut stragglers = 0;
        if let Some(pool) = read {
            stragglers += pool.join(self.config.join_timeout);
        }
        if let Some(pool) = write {
            stragglers += pool.join(self.config.join_timeout);
        }
        if stragglers > 0 {
            warn!(stragglers, "detached workers that ignored the stop request");
        }

        for handle in self.aux_threads.lock().drain(..) {
            if handle.join().is_err() {
                error!("auxiliary thread panicked");
            }
        }
    }

    /// Resize the worker pools of a running benchmark
    pub fn update_worker_counts(
        &self,
        num_readers: usize,
        num_writers: usize,
    ) -> Result<(), BenchError> {
        if *self.state.lock() != RunState::Running {
            return Err(BenchError::State(
                "worker counts can only change while running".to_string(),
            ));
        }
        let mut pools = self.pools.lock();
        if let Some(pool) = pools.read.as_mut() {
            pool.resize(num_readers)?;
        }
        if let Some(pool) = pools.write.as_mut() {
            pool.resize(num_writers)?;
        }
        Ok(())
    }

    /// Retarget the read rate limiter; applies in any state
    pub fn update_read_rate(&self, rate: f64) {
        info!(rate, "read rate updated");
        self.read_limiter.set_rate(rate);
    }

    /// Retarget the write rate limiter; applies in any state
    pub fn update_write_rate(&self, rate: f64) {
        info!(rate, "write rate updated");
        self.write_limiter.set_rate(rate);
    }

    /// Pre-populate the key space through the bound client
    ///
    /// Blocks until the pass finishes; typically run between
    /// [`init`](Driver::init) and [`start`](Driver::start) so reads have
    /// data to find.
    pub fn backfill(
        &self,
        backfill: &crate::core::Backfill,
        mode: crate::core::BackfillMode,
    ) -> Result<(), BenchError> {
        let client = self
            .client
            .lock()
            .clone()
            .ok_or_else(|| BenchError::Initialization("no client initialized".to_string()))?;
        backfill.run(client, mode)
    }

    /// Release the client, calling its shutdown hook
    ///
    /// Client shutdown errors are logged and swallowed; a failing backend
    /// must not wedge driver cleanup. No-op when no client is bound.
    pub fn shutdown_client(&self) {
        if let Some(client) = self.client.lock().take() {
            info!(connection = %client.connection_info(), "shutting down client");
            if let Err(e) = client.shutdown() {
                error!(%e, "client shutdown failed");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        *self.state.lock() == RunState::Running
    }

    pub fn run_state(&self) -> RunState {
        *self.state.lock()
    }

    /// The bound client's connection description, if one is bound
    pub fn connection_info(&self) -> Option<String> {
        self.client.lock().as_ref().map(|c| c.connection_info())
    }

    pub fn monitor(&self) -> &Arc<dyn Monitor> {
        &self.monitor
    }
}

/// Clamp a schedule's target so the limiter never interprets the ramp's
/// leading zero as "unlimited"
fn ramp_rate(schedule: &RampSchedule, elapsed: Duration) -> f64 {
    schedule.rate_at(elapsed).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CoreMonitor;
    use crate::generators::{DataGeneratorConfig, DefaultDataGenerator};

    struct StubClient {
        fail_init: bool,
    }

    impl Client for StubClient {
        fn init(&mut self, _generator: Arc<dyn DataGenerator>) -> Result<(), BenchError> {
            if self.fail_init {
                Err(BenchError::Initialization("no backend".to_string()))
            } else {
                Ok(())
            }
        }

        fn read_single(&self, key: &str) -> Result<Option<String>, BenchError> {
            Ok(Some(key.to_string()))
        }

        fn write_single(&self, key: &str) -> Result<String, BenchError> {
            Ok(key.to_string())
        }

        fn connection_info(&self) -> String {
            "stub".to_string()
        }
    }

    fn driver(config: DriverConfig) -> Driver {
        Driver::new(
            config,
            Arc::new(CoreMonitor::new()),
            Arc::new(DefaultDataGenerator::new(&DataGeneratorConfig {
                seed: Some(1),
                ..DataGeneratorConfig::default()
            })),
            Arc::new(RateLimiter::new(0.0)),
            Arc::new(RateLimiter::new(0.0)),
        )
    }

    fn quick_config() -> DriverConfig {
        DriverConfig {
            num_readers: 2,
            num_writers: 2,
            read_rate_limit: 0.0,
            write_rate_limit: 0.0,
            stats_update_interval: Duration::from_millis(50),
            join_timeout: Duration::from_secs(2),
            seed: Some(7),
            ..DriverConfig::default()
        }
    }

    #[test]
    fn init_twice_is_an_error() {
        let driver = driver(quick_config());
        driver.init(Box::new(StubClient { fail_init: false })).unwrap();
        let err = driver
            .init(Box::new(StubClient { fail_init: false }))
            .unwrap_err();
        assert!(matches!(err, BenchError::Initialization(_)));
    }

    #[test]
    fn failing_client_init_propagates() {
        let driver = driver(quick_config());
        let err = driver
            .init(Box::new(StubClient { fail_init: true }))
            .unwrap_err();
        assert!(matches!(err, BenchError::Initialization(_)));
        // the slot stays empty, a retry with a healthy client succeeds
        driver.init(Box::new(StubClient { fail_init: false })).unwrap();
    }

    #[test]
    fn start_without_client_fails_and_stays_stopped() {
        let driver = driver(quick_config());
        let err = driver
            .start(LoadPattern::Flat, 10, Duration::from_secs(1), 1)
            .unwrap_err();
        assert!(matches!(err, BenchError::Initialization(_)));
        assert_eq!(driver.run_state(), RunState::Stopped);
    }

    #[test]
    fn double_start_is_a_state_error() {
        let driver = driver(quick_config());
        driver.init(Box::new(StubClient { fail_init: false })).unwrap();
        driver
            .start(LoadPattern::Flat, 10, Duration::from_secs(1), 1)
            .unwrap();
        let err = driver
            .start(LoadPattern::Flat, 10, Duration::from_secs(1), 1)
            .unwrap_err();
        assert!(matches!(err, BenchError::State(_)));
        driver.stop().unwrap();
    }

    #[test]
    fn stop_when_stopped_is_a_state_error() {
        let driver = driver(quick_config());
        let err = driver.stop().unwrap_err();
        assert!(matches!(err, BenchError::State(_)));
    }

    #[test]
    fn lifecycle_reaches_running_then_stopped() {
        let driver = driver(quick_config());
        driver.init(Box::new(StubClient { fail_init: false })).unwrap();
        assert!(!driver.is_running());
        driver
            .start(LoadPattern::Flat, 10, Duration::from_secs(1), 1)
            .unwrap();
        assert!(driver.is_running());
        driver.stop().unwrap();
        assert_eq!(driver.run_state(), RunState::Stopped);
        // a second run on the same driver works
        driver
            .start(LoadPattern::Flat, 10, Duration::from_secs(1), 1)
            .unwrap();
        driver.stop().unwrap();
    }

    #[test]
    fn worker_updates_require_running() {
        let driver = driver(quick_config());
        let err = driver.update_worker_counts(4, 4).unwrap_err();
        assert!(matches!(err, BenchError::State(_)));
    }

    #[test]
    fn rate_updates_apply_immediately() {
        let driver = driver(quick_config());
        driver.update_read_rate(123.0);
        driver.update_write_rate(456.0);
        assert_eq!(driver.read_limiter.rate(), 123.0);
        assert_eq!(driver.write_limiter.rate(), 456.0);
    }

    #[test]
    fn ramp_floor_never_unlimits_the_limiter() {
        let schedule = RampSchedule::Linear {
            final_rate: 100.0,
            ramp_duration: Duration::from_secs(10),
        };
        assert_eq!(ramp_rate(&schedule, Duration::ZERO), 1.0);
        assert_eq!(ramp_rate(&schedule, Duration::from_secs(10)), 100.0);
    }

    #[test]
    fn backfill_requires_an_initialized_client() {
        use crate::core::{Backfill, BackfillConfig, BackfillMode};

        let driver = driver(quick_config());
        let backfill = Backfill::new(BackfillConfig {
            num_keys: 50,
            ..BackfillConfig::default()
        });
        let err = driver.backfill(&backfill, BackfillMode::Write).unwrap_err();
        assert!(matches!(err, BenchError::Initialization(_)));

        driver.init(Box::new(StubClient { fail_init: false })).unwrap();
        driver.backfill(&backfill, BackfillMode::Write).unwrap();
        assert_eq!(backfill.keys_filled(), 50);
    }

    #[test]
    fn shutdown_client_is_idempotent() {
        let driver = driver(quick_config());
        driver.init(Box::new(StubClient { fail_init: false })).unwrap();
        assert_eq!(driver.connection_info().as_deref(), Some("stub"));
        driver.shutdown_client();
        assert_eq!(driver.connection_info(), None);
        driver.shutdown_client();
    }
}
