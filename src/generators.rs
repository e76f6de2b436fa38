//! Key-stream and value generators
//!
//! The key stream decides *which* records a run touches; the
//! [`DataGenerator`] decides what gets written. Generators are shared by
//! every worker of an operation type, so they take `&self` and keep their
//! RNG behind a mutex. Keys follow the `T{index}` convention so that reads
//! and writes land on the same key space.

use crate::client::DataGenerator;
use crate::core::BenchError;
use parking_lot::Mutex;
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Zipf;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::info;

/// How keys are drawn from the key space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDistribution {
    /// Uniformly random over the whole key space
    Random,
    /// A window that slides across the key space over the run's duration
    SlidingWindow,
    /// Fixed-size windows visited in sequence, wrapping around
    SlidingWindowFlip,
    /// Zipf-distributed hot keys
    Zipfian,
}

impl FromStr for KeyDistribution {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, BenchError> {
        match s.to_lowercase().as_str() {
            "random" => Ok(KeyDistribution::Random),
            "sliding_window" => Ok(KeyDistribution::SlidingWindow),
            "sliding_window_flip" => Ok(KeyDistribution::SlidingWindowFlip),
            "zipfian" => Ok(KeyDistribution::Zipfian),
            _ => Err(BenchError::State(format!(
                "invalid key distribution: {s}. Valid options are: \
                 random, sliding_window, sliding_window_flip, zipfian"
            ))),
        }
    }
}

impl fmt::Display for KeyDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyDistribution::Random => write!(f, "random"),
            KeyDistribution::SlidingWindow => write!(f, "sliding_window"),
            KeyDistribution::SlidingWindowFlip => write!(f, "sliding_window_flip"),
            KeyDistribution::Zipfian => write!(f, "zipfian"),
        }
    }
}

/// One side's key stream; shared by all workers of that operation type
pub trait KeyGenerator: Send + Sync {
    /// The next key to operate on
    fn next_key(&self) -> String;

    /// Whether the stream has more keys; window generators return false
    /// once the run's duration has elapsed, which ends that side of the run
    fn has_next_key(&self) -> bool {
        true
    }
}

/// Parameters for building a key generator
#[derive(Debug, Clone)]
pub struct KeyStreamConfig {
    pub distribution: KeyDistribution,
    /// Size of the key space; keys are `T0 .. T{num_keys-1}`
    pub num_keys: u64,
    /// Window width for the sliding-window distributions
    pub window_size: u64,
    /// Run duration (sliding window) or per-window dwell time (flip)
    pub window_duration: Duration,
    /// Zipf exponent, only used by [`KeyDistribution::Zipfian`]
    pub zipf_exponent: f64,
    /// Materialize every key string up front instead of formatting on
    /// each draw; trades memory for hot-path allocations
    pub preload_keys: bool,
    /// Fixed RNG seed for reproducible key streams
    pub seed: Option<u64>,
}

/// Key-space lookup, optionally backed by pre-materialized strings
struct KeyPool {
    preloaded: Option<Vec<String>>,
}

impl KeyPool {
    fn new(num_keys: u64, preload: bool) -> Self {
        let preloaded = if preload {
            Some((0..num_keys).map(|i| format!("T{i}")).collect())
        } else {
            None
        };
        KeyPool { preloaded }
    }

    fn key(&self, index: u64) -> String {
        match &self.preloaded {
            Some(keys) => keys[index as usize].clone(),
            None => format!("T{index}"),
        }
    }
}

fn new_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Build the generator for `config`, validating its parameters
pub fn create_key_generator(
    config: &KeyStreamConfig,
) -> Result<Box<dyn KeyGenerator>, BenchError> {
    if config.num_keys == 0 {
        return Err(BenchError::Initialization(
            "num_keys must be > 0".to_string(),
        ));
    }
    info!(
        distribution = %config.distribution,
        num_keys = config.num_keys,
        "loading key generator"
    );
    let pool = KeyPool::new(config.num_keys, config.preload_keys);
    match config.distribution {
        KeyDistribution::Random => Ok(Box::new(RandomKeyGenerator {
            num_keys: config.num_keys,
            pool,
            rng: Mutex::new(new_rng(config.seed)),
        })),
        KeyDistribution::SlidingWindow => {
            if config.window_size == 0 || config.window_size > config.num_keys {
                return Err(BenchError::Initialization(format!(
                    "window_size must be in 1..={}",
                    config.num_keys
                )));
            }
            Ok(Box::new(SlidingWindowKeyGenerator {
                num_keys: config.num_keys,
                window_size: config.window_size,
                duration: config.window_duration,
                start: Instant::now(),
                pool,
                rng: Mutex::new(new_rng(config.seed)),
            }))
        }
        KeyDistribution::SlidingWindowFlip => {
            if config.window_size == 0 || config.window_size > config.num_keys {
                return Err(BenchError::Initialization(format!(
                    "window_size must be in 1..={}",
                    config.num_keys
                )));
            }
            Ok(Box::new(SlidingWindowFlipKeyGenerator {
                num_keys: config.num_keys,
                window_size: config.window_size,
                window_duration: config.window_duration,
                start: Instant::now(),
                pool,
                rng: Mutex::new(new_rng(config.seed)),
            }))
        }
        KeyDistribution::Zipfian => {
            let zipf = Zipf::new(config.num_keys, config.zipf_exponent).map_err(|e| {
                BenchError::Initialization(format!(
                    "invalid zipf exponent {}: {e}",
                    config.zipf_exponent
                ))
            })?;
            Ok(Box::new(ZipfianKeyGenerator {
                zipf,
                pool,
                rng: Mutex::new(new_rng(config.seed)),
            }))
        }
    }
}

struct RandomKeyGenerator {
    num_keys: u64,
    pool: KeyPool,
    rng: Mutex<StdRng>,
}

impl KeyGenerator for RandomKeyGenerator {
    fn next_key(&self) -> String {
        let index = self.rng.lock().gen_range(0..self.num_keys);
        self.pool.key(index)
    }
}

/// Slides a `window_size`-wide window from the bottom of the key space to
/// the top over `duration`, then reports exhaustion
struct SlidingWindowKeyGenerator {
    num_keys: u64,
    window_size: u64,
    duration: Duration,
    start: Instant,
    pool: KeyPool,
    rng: Mutex<StdRng>,
}

impl SlidingWindowKeyGenerator {
    fn window_start(&self) -> u64 {
        let progress =
            (self.start.elapsed().as_secs_f64() / self.duration.as_secs_f64()).min(1.0);
        (progress * (self.num_keys - self.window_size) as f64).round() as u64
    }
}

impl KeyGenerator for SlidingWindowKeyGenerator {
    fn next_key(&self) -> String {
        let min = self.window_start();
        let index = self.rng.lock().gen_range(min..min + self.window_size);
        self.pool.key(index)
    }

    fn has_next_key(&self) -> bool {
        self.start.elapsed() <= self.duration
    }
}

/// Visits fixed windows in sequence, dwelling `window_duration` in each and
/// wrapping around the key space indefinitely
struct SlidingWindowFlipKeyGenerator {
    num_keys: u64,
    window_size: u64,
    window_duration: Duration,
    start: Instant,
    pool: KeyPool,
    rng: Mutex<StdRng>,
}

impl KeyGenerator for SlidingWindowFlipKeyGenerator {
    fn next_key(&self) -> String {
        let windows = (self.num_keys / self.window_size).max(1);
        let elapsed_windows =
            self.start.elapsed().as_nanos() / self.window_duration.as_nanos().max(1);
        let current = (elapsed_windows % u128::from(windows)) as u64;
        let min = current * self.window_size;
        let index = self.rng.lock().gen_range(min..min + self.window_size);
        self.pool.key(index)
    }
}

struct ZipfianKeyGenerator {
    zipf: Zipf<f64>,
    pool: KeyPool,
    rng: Mutex<StdRng>,
}

impl KeyGenerator for ZipfianKeyGenerator {
    fn next_key(&self) -> String {
        // Zipf samples in 1..=num_keys; shift down to the T0-based space
        let sample = self.rng.lock().sample(self.zipf) as u64;
        self.pool.key(sample - 1)
    }
}

/// Parameters for [`DefaultDataGenerator`]
#[derive(Debug, Clone)]
pub struct DataGeneratorConfig {
    /// Number of distinct values to pre-materialize
    pub num_values: usize,
    /// Payload size in bytes when `variable_size` is off
    pub data_size: usize,
    /// Draw each payload size uniformly from `[lower_bound, upper_bound]`
    pub variable_size: bool,
    pub size_lower_bound: usize,
    pub size_upper_bound: usize,
    /// Reuse a single payload for every value (cheapest possible stream)
    pub use_static_data: bool,
    pub seed: Option<u64>,
}

impl Default for DataGeneratorConfig {
    fn default() -> Self {
        DataGeneratorConfig {
            num_values: 100,
            data_size: 128,
            variable_size: false,
            size_lower_bound: 100,
            size_upper_bound: 1000,
            use_static_data: false,
            seed: None,
        }
    }
}

/// Default [`DataGenerator`]: a pre-materialized pool of random payloads
///
/// Values are generated once at construction so the hot path is a cheap
/// indexed clone rather than fresh string generation per operation.
pub struct DefaultDataGenerator {
    values: Vec<String>,
    rng: Mutex<StdRng>,
}

impl DefaultDataGenerator {
    pub fn new(config: &DataGeneratorConfig) -> Self {
        let mut rng = new_rng(config.seed);
        let static_value = Alphanumeric.sample_string(&mut rng, config.data_size);
        let mut values = Vec::with_capacity(config.num_values.max(1));
        for _ in 0..config.num_values.max(1) {
            let value = if config.use_static_data {
                static_value.clone()
            } else if config.variable_size && config.size_upper_bound > config.size_lower_bound {
                let size = rng.gen_range(config.size_lower_bound..=config.size_upper_bound);
                Alphanumeric.sample_string(&mut rng, size)
            } else {
                Alphanumeric.sample_string(&mut rng, config.data_size)
            };
            values.push(value);
        }
        DefaultDataGenerator {
            values,
            rng: Mutex::new(rng),
        }
    }
}

impl DataGenerator for DefaultDataGenerator {
    fn random_value(&self) -> String {
        let index = self.rng.lock().gen_range(0..self.values.len());
        self.values[index].clone()
    }

    fn random_integer(&self) -> i32 {
        self.rng.lock().r#gen()
    }
}
