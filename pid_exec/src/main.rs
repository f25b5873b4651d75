//! Main PID control executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logging and parameters
//!     - Connect the message bus and subscribe the control loop's event
//!       handlers
//!     - Wait in the foreground until CTRL-C, while the control loop runs
//!       entirely on the bus's delivery threads
//!     - On shutdown, stop event delivery, then flush the telemetry logs and
//!       render the results plot into the session directory

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::info;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

// Internal
use bus_if::net::{BusParams, ZmqBus};
use pid_lib::ctrl_loop::{ControlLoopHandler, Params};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Period of the foreground wait loop, which only exists to poll the
/// shutdown flag.
const WAIT_LOOP_PERIOD_MS: u64 = 100;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("pid_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution
    info!("PID Velocity Control Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let ctrl_params: Params =
        util::params::load("ctrl_loop.toml").wrap_err("Could not load control loop params")?;

    let bus_params: BusParams =
        util::params::load("bus.toml").wrap_err("Could not load bus params")?;

    info!("Parameters loaded");
    info!(
        "    Gains: k_p = {}, k_i = {}, k_d = {}",
        ctrl_params.k_p, ctrl_params.k_i, ctrl_params.k_d
    );

    // ---- INITIALISE BUS AND CONTROL LOOP ----

    let bus = Arc::new(ZmqBus::new(&bus_params).wrap_err("Failed to create the message bus")?);

    let ctrl_loop = ControlLoopHandler::new(bus.clone(), ctrl_params);

    ctrl_loop
        .start()
        .wrap_err("Failed to start the control loop")?;

    info!("PID controller running (CTRL-C to terminate)\n");

    // ---- WAIT FOR SHUTDOWN ----

    let run = Arc::new(AtomicBool::new(true));

    let run_flag = run.clone();
    ctrlc::set_handler(move || run_flag.store(false, Ordering::Relaxed))
        .wrap_err("Failed to set the CTRL-C handler")?;

    while run.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(WAIT_LOOP_PERIOD_MS));
    }

    // ---- SHUTDOWN ----

    info!("Shutdown requested");

    // Stop event delivery before touching the telemetry so no sample arrives
    // mid-flush
    bus.shutdown();

    let num_samples = ctrl_loop
        .finish(&session)
        .wrap_err("Failed to persist telemetry")?;

    info!("{} aligned telemetry samples persisted", num_samples);
    info!("Done");

    Ok(())
}
