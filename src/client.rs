//! The pluggable backend client contract
//!
//! Every backend (a key-value store, a document store, a cache) plugs into
//! the driver by implementing [`Client`]. The driver core never speaks a
//! wire protocol itself: it draws keys from a [`DataGenerator`], paces
//! submissions through the shared rate limiter, and delegates the actual
//! store interaction to the client.
//!
//! # Auto-tuning
//!
//! The `auto_tune_*` hooks let a client steer the shared rate limiter from
//! feedback it alone can interpret (throttling responses, queue depths).
//! Both hooks default to returning `-1.0`, meaning "no change"; any value
//! `<= 0` is ignored by the driver. Returning
//! [`BenchError::Unsupported`] is treated the same way and reported once.

use crate::core::{BenchError, Monitor};
use std::sync::Arc;

/// A backend-specific adapter translating driver operations into vendor calls
///
/// Implementations must be safe to share across worker threads; any mutable
/// connection state belongs behind interior synchronization. The driver calls
/// [`init`](Client::init) exactly once before any operation and
/// [`shutdown`](Client::shutdown) at most once afterwards.
pub trait Client: Send + Sync {
    /// Bind the client to its data generator and open connections
    ///
    /// Called exactly once. An error here is fatal to the run.
    fn init(&mut self, data_generator: Arc<dyn DataGenerator>) -> Result<(), BenchError>;

    /// Read one key. `Ok(None)` (or an empty value) denotes a cache miss,
    /// not a failure; hard failures are errors.
    fn read_single(&self, key: &str) -> Result<Option<String>, BenchError>;

    /// Write one key. Any error is a hard failure.
    fn write_single(&self, key: &str) -> Result<String, BenchError>;

    /// Read a batch of keys in one logical call
    ///
    /// Optional; the default signals [`BenchError::Unsupported`], which the
    /// driver treats as a configuration error for bulk mode rather than a
    /// per-call failure.
    fn read_bulk(&self, _keys: &[String]) -> Result<Vec<Option<String>>, BenchError> {
        Err(BenchError::Unsupported("read_bulk"))
    }

    /// Write a batch of keys in one logical call; optional, see
    /// [`read_bulk`](Client::read_bulk)
    fn write_bulk(&self, _keys: &[String]) -> Result<Vec<String>, BenchError> {
        Err(BenchError::Unsupported("write_bulk"))
    }

    /// Best-effort cleanup; errors are logged by the driver, never propagated
    fn shutdown(&self) -> Result<(), BenchError> {
        Ok(())
    }

    /// Diagnostic description of where this client is connected
    fn connection_info(&self) -> String;

    /// Suggest a new write rate from the latest write result and run stats
    ///
    /// `last_result` is the value returned by the most recent
    /// [`write_single`](Client::write_single). Return `<= 0.0` for "no
    /// change". Concurrent workers race to apply suggestions with
    /// last-writer-wins semantics; only the long-run trend is meaningful.
    fn auto_tune_write_rate_limit(
        &self,
        _current_rate: f64,
        _last_result: &str,
        _monitor: &dyn Monitor,
    ) -> Result<f64, BenchError> {
        Ok(-1.0)
    }

    /// Suggest a new read rate from run stats; same contract as
    /// [`auto_tune_write_rate_limit`](Client::auto_tune_write_rate_limit)
    fn auto_tune_read_rate_limit(
        &self,
        _current_rate: f64,
        _monitor: &dyn Monitor,
    ) -> Result<f64, BenchError> {
        Ok(-1.0)
    }
}

/// Produces the key and value streams consumed by the driver
///
/// Deterministic, seedable behavior is the generator's responsibility; the
/// driver invokes it once per operation (or once per batch in bulk mode)
/// and owns no key-space logic of its own.
pub trait DataGenerator: Send + Sync {
    /// A value payload for a write operation
    fn random_value(&self) -> String;

    /// An integer for clients that key on numeric columns
    fn random_integer(&self) -> i32;
}
