//! # PID velocity-control library.
//!
//! This library allows other crates (and the executable's tests) to access
//! the items making up the control loop.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Control loop module - reacts to bus events and drives the PID controller
pub mod ctrl_loop;

/// PID controller module - computes an acceleration demand from a velocity error
pub mod pid;

/// Telemetry module - records aligned control-loop samples for offline review
pub mod telemetry;
