//! # PID controller module
//!
//! This module provides the PID engine which turns a velocity error signal
//! and an external clock into an acceleration demand.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID controller over a velocity error signal.
///
/// The controller is not time-aware: the caller supplies the clock value with
/// every sample, which keeps the control law reproducible under simulated or
/// accelerated time sources.
///
/// A `previous_time` of `0.0` is the sentinel for "no prior sample". The
/// first [`PidController::compute`] call after construction or a
/// [`PidController::reset`] only records the clock and outputs zero, since
/// with no prior sample the derivative term is undefined.
#[derive(Debug, Serialize, Clone)]
pub struct PidController {
    /// Proportional gain
    k_p: f64,

    /// Integral gain
    k_i: f64,

    /// Derivative gain
    k_d: f64,

    /// Error of the most recent sample
    velocity_error: f64,

    /// Error of the sample before that
    previous_error: f64,

    /// The integral accumulation
    accumulated_error: f64,

    /// Clock value of the previous sample, 0.0 if there is none
    previous_time: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during a PID computation.
#[derive(Debug, Error)]
pub enum PidError {
    #[error(
        "The clock must be strictly increasing between samples \
         (got delta_time = {delta_s} s)"
    )]
    NonMonotonicTime { delta_s: f64 },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {
    /// Create a new controller with the given gains.
    pub fn new(k_p: f64, k_i: f64, k_d: f64) -> Self {
        Self {
            k_p,
            k_i,
            k_d,
            velocity_error: 0.0,
            previous_error: 0.0,
            accumulated_error: 0.0,
            previous_time: 0.0,
        }
    }

    /// Compute the acceleration demand for the given velocities and clock
    /// value.
    ///
    /// The output is unclamped, range limiting is the job of the downstream
    /// actuation mapper.
    ///
    /// A `NonMonotonicTime` error leaves the controller state exactly as it
    /// was, the failed sample is simply discarded.
    pub fn compute(
        &mut self,
        desired_velocity: f64,
        current_velocity: f64,
        current_time: f64,
    ) -> Result<f64, PidError> {
        // Bootstrap: with no prior sample there is no delta time, so just
        // record the clock and output nothing
        if self.previous_time == 0.0 {
            self.previous_time = current_time;
            return Ok(0.0);
        }

        let delta_time = current_time - self.previous_time;

        // Validate before mutating so a failed call has no side effects
        if delta_time <= 0.0 {
            return Err(PidError::NonMonotonicTime { delta_s: delta_time });
        }

        self.previous_time = current_time;

        self.previous_error = self.velocity_error;
        self.velocity_error = desired_velocity - current_velocity;
        self.accumulated_error += self.velocity_error * delta_time;

        let derivative_error = (self.velocity_error - self.previous_error) / delta_time;

        Ok(self.k_p * self.velocity_error
            + self.k_i * self.accumulated_error
            + self.k_d * derivative_error)
    }

    /// Clear all error accumulators and the time reference.
    ///
    /// The next [`PidController::compute`] call behaves exactly like the very
    /// first call on a freshly constructed controller. Must be called on
    /// every activation transition so a re-engaged controller doesn't act on
    /// stale history.
    pub fn reset(&mut self) {
        self.velocity_error = 0.0;
        self.previous_error = 0.0;
        self.accumulated_error = 0.0;
        self.previous_time = 0.0;
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_first_compute_bootstraps() {
        let mut pid = PidController::new(2.0, 0.5, 0.1);

        // Whatever the velocities, the first sample only records the clock
        assert_eq!(pid.compute(100.0, -40.0, 3.5).unwrap(), 0.0);
        assert_eq!(pid.previous_time, 3.5);
        assert_eq!(pid.velocity_error, 0.0);
        assert_eq!(pid.accumulated_error, 0.0);
    }

    #[test]
    fn test_proportional_only() {
        let mut pid = PidController::new(1.0, 0.0, 0.0);

        assert_eq!(pid.compute(10.0, 0.0, 0.0).unwrap(), 0.0);
        assert_eq!(pid.compute(10.0, 0.0, 1.0).unwrap(), 10.0);
    }

    #[test]
    fn test_integral_accumulation() {
        let mut pid = PidController::new(0.0, 1.0, 0.0);

        pid.compute(1.0, 0.0, 1.0).unwrap();

        // Error 1.0 over 1 s, then again over 2 s
        assert_eq!(pid.compute(1.0, 0.0, 2.0).unwrap(), 1.0);
        assert_eq!(pid.compute(1.0, 0.0, 4.0).unwrap(), 3.0);
    }

    #[test]
    fn test_non_monotonic_time_is_an_error() {
        let mut pid = PidController::new(1.0, 1.0, 1.0);

        pid.compute(10.0, 5.0, 2.0).unwrap();
        pid.compute(10.0, 5.0, 3.0).unwrap();

        let before = pid.clone();

        // Repeated and backwards clock values must both fail
        assert!(matches!(
            pid.compute(10.0, 2.0, 3.0),
            Err(PidError::NonMonotonicTime { .. })
        ));
        assert!(matches!(
            pid.compute(10.0, 2.0, 1.0),
            Err(PidError::NonMonotonicTime { .. })
        ));

        // And must leave the controller untouched
        assert_eq!(pid.previous_error, before.previous_error);
        assert_eq!(pid.accumulated_error, before.accumulated_error);
        assert_eq!(pid.velocity_error, before.velocity_error);
        assert_eq!(pid.previous_time, before.previous_time);
    }

    #[test]
    fn test_reset_restores_bootstrap() {
        let mut pid = PidController::new(1.0, 1.0, 1.0);

        pid.compute(10.0, 5.0, 1.0).unwrap();
        pid.compute(10.0, 6.0, 2.0).unwrap();

        pid.reset();

        // Identical to a fresh controller: zero output, clock recorded
        assert_eq!(pid.compute(10.0, 6.0, 7.0).unwrap(), 0.0);
        assert_eq!(pid.previous_time, 7.0);
        assert_eq!(pid.accumulated_error, 0.0);
        assert_eq!(pid.previous_error, 0.0);
    }
}
