//! # loadcrab
//!
//! A pluggable load-generation and benchmarking driver for data stores.
//!
//! loadcrab drives a configurable mix of read and write traffic against any
//! backend that implements the [`Client`] trait, pacing submissions through
//! runtime-reconfigurable rate limiters and collecting latency and
//! success/failure statistics in a thread-safe [`Monitor`]. Worker counts
//! and target rates can change while a run is in flight, and ramp schedules
//! can climb the load toward its target in steps instead of all at once.
//!
//! ## Architecture
//!
//! ```text
//!                    +----------- Driver ------------+
//!                    | state machine, ramp control,  |
//!                    | reporting, lifecycle          |
//!                    +---+----------------------+----+
//!                        |                      |
//!              +---------v-------+    +---------v--------+
//!              | read WorkerPool |    | write WorkerPool |
//!              +---------+-------+    +---------+--------+
//!                        |                      |
//!    KeyGenerator -> RateLimiter -> BenchOperation -> Client
//!                                        |
//!                                     Monitor
//! ```
//!
//! Each worker thread runs the same loop: draw keys, wait for a permit from
//! the shared rate limiter, execute one operation against the client, record
//! the outcome on the monitor. The driver owns everything else.
//!
//! ## Quick start
//!
//! ```no_run
//! use loadcrab::{
//!     BenchError, Client, CoreMonitor, DataGenerator, DataGeneratorConfig,
//!     DefaultDataGenerator, Driver, DriverConfig, LoadPattern, RateLimiter,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct InMemoryClient;
//!
//! impl Client for InMemoryClient {
//!     fn init(&mut self, _generator: Arc<dyn DataGenerator>) -> Result<(), BenchError> {
//!         Ok(())
//!     }
//!     fn read_single(&self, _key: &str) -> Result<Option<String>, BenchError> {
//!         Ok(None)
//!     }
//!     fn write_single(&self, key: &str) -> Result<String, BenchError> {
//!         Ok(key.to_string())
//!     }
//!     fn connection_info(&self) -> String {
//!         "in-memory".to_string()
//!     }
//! }
//!
//! fn main() -> Result<(), BenchError> {
//!     let config = DriverConfig::default();
//!     let driver = Driver::new(
//!         config,
//!         Arc::new(CoreMonitor::new()),
//!         Arc::new(DefaultDataGenerator::new(&DataGeneratorConfig::default())),
//!         Arc::new(RateLimiter::new(1000.0)),
//!         Arc::new(RateLimiter::new(1000.0)),
//!     );
//!     driver.init(Box::new(InMemoryClient))?;
//!     driver.start(LoadPattern::StepWise, 10, Duration::from_secs(6), 1)?;
//!     std::thread::sleep(Duration::from_secs(60));
//!     driver.stop()?;
//!     driver.shutdown_client();
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod core;
pub mod driver;
pub mod generators;
pub mod registry;
pub mod util;

pub use client::{Client, DataGenerator};
pub use self::core::{
    Backfill, BackfillConfig, BackfillMode, BenchError, BenchOperation, CoreMonitor,
    LatencySummary, LoadPattern, Monitor,
    MonitorSnapshot, OpKind, OpStatus, RampSchedule, RateLimiter, ReadOperation, RpsTracker,
    StepWiseRateIncreaser, WriteOperation,
};
pub use driver::{Driver, DriverConfig, RunState};
pub use generators::{
    DataGeneratorConfig, DefaultDataGenerator, KeyDistribution, KeyGenerator, KeyStreamConfig,
    create_key_generator,
};
pub use registry::ClientRegistry;
pub use util::{append_checksum, is_checksum_valid};
