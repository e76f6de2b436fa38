//! Ramp schedules for shaping the target operation rate over a run
//!
//! A [`RampSchedule`] is a pure function from elapsed run time to a target
//! rate. It owns no limiter and spawns no threads: the driver's ramp-control
//! loop evaluates it periodically and feeds the result into
//! [`RateLimiter::set_rate`](crate::RateLimiter::set_rate), which keeps the
//! schedule independently testable.

use crate::core::BenchError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How the target operation rate changes over the life of a run
///
/// Selected by the control surface; `window_size` and `window_duration`
/// passed to [`Driver::start`](crate::Driver::start) parameterize the
/// non-flat variants (number of steps and step length respectively).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPattern {
    /// Constant rate from the first operation
    Flat,
    /// Linear climb from zero to the configured rate
    Ramp,
    /// Discrete equal-sized steps up to the configured rate
    StepWise,
}

impl FromStr for LoadPattern {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, BenchError> {
        match s.to_lowercase().as_str() {
            "flat" => Ok(LoadPattern::Flat),
            "ramp" => Ok(LoadPattern::Ramp),
            "steps" | "step_wise" | "stepwise" => Ok(LoadPattern::StepWise),
            _ => Err(BenchError::State(format!(
                "invalid load pattern: {s}. Valid options are: flat, ramp, steps"
            ))),
        }
    }
}

impl fmt::Display for LoadPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadPattern::Flat => write!(f, "flat"),
            LoadPattern::Ramp => write!(f, "ramp"),
            LoadPattern::StepWise => write!(f, "steps"),
        }
    }
}

/// Steps a rate from zero to `final_rate` in `num_steps` equal increments
///
/// The rate is zero until the first step boundary, then climbs by
/// `final_rate / num_steps` at every multiple of `step_duration`, reaching
/// exactly `final_rate` at `num_steps * step_duration` and holding it
/// forever after. Arbitrarily large elapsed times clamp to the final rate;
/// the computation never wraps.
#[derive(Debug, Clone, Copy)]
pub struct StepWiseRateIncreaser {
    final_rate: f64,
    num_steps: u32,
    step_duration: Duration,
}

impl StepWiseRateIncreaser {
    pub fn new(
        final_rate: f64,
        num_steps: u32,
        step_duration: Duration,
    ) -> Result<Self, BenchError> {
        if final_rate <= 0.0 {
            return Err(BenchError::Initialization(
                "final_rate must be > 0".to_string(),
            ));
        }
        if num_steps == 0 {
            return Err(BenchError::Initialization(
                "num_steps must be > 0".to_string(),
            ));
        }
        if step_duration.is_zero() {
            return Err(BenchError::Initialization(
                "step_duration must be > 0".to_string(),
            ));
        }
        Ok(StepWiseRateIncreaser {
            final_rate,
            num_steps,
            step_duration,
        })
    }

    /// Target rate after `elapsed` run time
    pub fn rate_at(&self, elapsed: Duration) -> f64 {
        // u128 nanosecond arithmetic: elapsed near u64::MAX nanos cannot
        // overflow the division, it can only land in the clamped branch.
        let steps_done = elapsed.as_nanos() / self.step_duration.as_nanos();
        if steps_done >= u128::from(self.num_steps) {
            return self.final_rate;
        }
        steps_done as f64 * (self.final_rate / f64::from(self.num_steps))
    }
}

/// A pure mapping from elapsed run time to target rate
///
/// One schedule exists per operation direction (read/write); the driver
/// evaluates both from a single ramp-control thread.
#[derive(Debug, Clone, Copy)]
pub enum RampSchedule {
    /// `final_rate` from t = 0
    Immediate { final_rate: f64 },
    /// Linear climb from 0 to `final_rate` over `ramp_duration`
    Linear {
        final_rate: f64,
        ramp_duration: Duration,
    },
    /// Discrete steps, see [`StepWiseRateIncreaser`]
    StepWise(StepWiseRateIncreaser),
}

impl RampSchedule {
    /// Build the schedule for `pattern` targeting `final_rate`
    ///
    /// For [`LoadPattern::Ramp`] the total climb takes
    /// `num_steps * step_duration`; for [`LoadPattern::StepWise`] those are
    /// the literal step count and step length.
    pub fn for_pattern(
        pattern: LoadPattern,
        final_rate: f64,
        num_steps: u32,
        step_duration: Duration,
    ) -> Result<Self, BenchError> {
        match pattern {
            LoadPattern::Flat => Ok(RampSchedule::Immediate { final_rate }),
            LoadPattern::Ramp => Ok(RampSchedule::Linear {
                final_rate,
                ramp_duration: step_duration.saturating_mul(num_steps.max(1)),
            }),
            LoadPattern::StepWise => Ok(RampSchedule::StepWise(StepWiseRateIncreaser::new(
                final_rate,
                num_steps,
                step_duration,
            )?)),
        }
    }

    /// Target rate after `elapsed` run time
    pub fn rate_at(&self, elapsed: Duration) -> f64 {
        match self {
            RampSchedule::Immediate { final_rate } => *final_rate,
            RampSchedule::Linear {
                final_rate,
                ramp_duration,
            } => {
                if elapsed >= *ramp_duration {
                    *final_rate
                } else {
                    final_rate * elapsed.as_secs_f64() / ramp_duration.as_secs_f64()
                }
            }
            RampSchedule::StepWise(increaser) => increaser.rate_at(elapsed),
        }
    }

    /// Whether the schedule has reached its final rate at `elapsed`
    ///
    /// Once this returns true the ramp-control loop can stop evaluating.
    pub fn is_final(&self, elapsed: Duration) -> bool {
        match self {
            RampSchedule::Immediate { .. } => true,
            RampSchedule::Linear { ramp_duration, .. } => elapsed >= *ramp_duration,
            RampSchedule::StepWise(increaser) => {
                increaser.rate_at(elapsed) == increaser.final_rate
            }
        }
    }
}
