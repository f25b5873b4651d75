//! Control loop module
//!
//! The control loop reacts to four independent event streams arriving over
//! the message bus (clock, current velocity, desired velocity and
//! enable/disable) and, while enabled, runs the PID controller on every
//! current-velocity sample, publishing the resulting acceleration demand.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during control loop operation.
///
/// Per-event failures (malformed payloads, non-monotonic clock samples) are
/// handled inside the event handlers and never surface here, the loop must
/// keep accepting messages after any of them.
#[derive(Debug, thiserror::Error)]
pub enum CtrlLoopError {
    #[error("Could not subscribe to topic {0}: {1}")]
    SubscribeError(String, bus_if::net::BusError),

    #[error("Could not persist telemetry: {0}")]
    TelemetryError(#[from] crate::telemetry::TelemetryError),
}
