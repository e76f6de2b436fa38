//! Core components of the loadcrab benchmarking driver
//!
//! This module contains the hot machinery shared by every benchmark run:
//! - [`backfill`]: parallel pre-population of the key space
//! - [`rate_limiter`]: token-bucket submission pacing, reconfigurable at runtime
//! - [`rate_increaser`]: pure ramp schedules evaluated by the ramp-control loop
//! - [`monitor`]: thread-safe counters and latency histograms
//! - [`operations`]: single units of read/write work against the client
//! - [`worker`]: dynamically resizable worker pools
//! - [`rps`]: the periodic throughput reporter

pub mod backfill;
pub mod monitor;
pub mod operations;
pub mod rate_increaser;
pub mod rate_limiter;
pub mod rps;
pub mod worker;

pub use backfill::{Backfill, BackfillConfig, BackfillMode};
pub use monitor::{CoreMonitor, LatencySummary, Monitor, MonitorSnapshot};
pub use operations::{BenchOperation, OpKind, OpStatus, ReadOperation, WriteOperation};
pub use rate_increaser::{LoadPattern, RampSchedule, StepWiseRateIncreaser};
pub use rate_limiter::RateLimiter;
pub use rps::RpsTracker;
pub use worker::WorkerPool;

use std::error::Error;
use std::fmt;

/// Errors surfaced by the benchmarking core
///
/// Only [`Initialization`](BenchError::Initialization) and
/// [`State`](BenchError::State) ever escape the driver's public API.
/// Everything else is absorbed inside the worker loop and reflected
/// through monitor counters and logs.
#[derive(Debug)]
pub enum BenchError {
    /// Client or driver setup failed; fatal to the run
    Initialization(String),
    /// A single read/write failed; recovered locally and counted
    Operation(String),
    /// A capability (bulk, auto-tune) the active client does not implement
    Unsupported(&'static str),
    /// An invalid lifecycle transition was attempted
    State(String),
    /// Cleanup failure; logged, never blocks the rest of shutdown
    Shutdown(String),
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchError::Initialization(msg) => write!(f, "initialization failed: {msg}"),
            BenchError::Operation(msg) => write!(f, "operation failed: {msg}"),
            BenchError::Unsupported(what) => write!(f, "unsupported operation: {what}"),
            BenchError::State(msg) => write!(f, "invalid state transition: {msg}"),
            BenchError::Shutdown(msg) => write!(f, "shutdown failure: {msg}"),
        }
    }
}

impl Error for BenchError {}
