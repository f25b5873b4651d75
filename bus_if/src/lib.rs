//! # Bus Interface
//!
//! This library defines the message-bus boundary of the PID velocity-control
//! software: the publish/subscribe capability the control loop consumes, the
//! ZMQ transport implementing it, and the textual payload encodings used on
//! the wire.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod net;
pub mod payload;
