//! Parameters structure for the control loop

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the control loop.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    // ---- GAINS ----

    /// Proportional gain
    pub k_p: f64,

    /// Integral gain
    pub k_i: f64,

    /// Derivative gain
    pub k_d: f64,

    // ---- TOPICS ----

    /// Topic carrying the external clock value.
    ///
    /// Units: seconds
    pub clock_topic: String,

    /// Topic carrying the measured vehicle velocity. Each message on this
    /// topic triggers a computation while the controller is active.
    pub current_velocity_topic: String,

    /// Topic carrying the target velocity
    pub desired_velocity_topic: String,

    /// Topic carrying enable/disable boolean tokens
    pub enable_topic: String,

    /// Topic the acceleration demand is published on
    pub actuation_topic: String,
}
