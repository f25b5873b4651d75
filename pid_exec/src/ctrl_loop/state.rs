//! Implementations for the control loop handler

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};

// Internal
use super::{CtrlLoopError, Params};
use crate::pid::PidController;
use crate::telemetry::{TelemetrySample, TelemetryStore};
use bus_if::net::MessageBus;
use bus_if::payload::{parse_bool_token, parse_real};
use util::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The control loop handler.
///
/// Owns the PID controller, the activation flag and the latest observed
/// inputs, and reacts to the four input event streams. The handler is
/// `Clone`: each bus subscription closure holds its own handle onto the
/// shared internals.
///
/// All mutable state sits behind a single mutex, so events delivered
/// concurrently on different bus threads are serialised and every
/// computation sees a consistent desired/current/clock snapshot.
#[derive(Clone)]
pub struct ControlLoopHandler {
    bus: Arc<dyn MessageBus>,

    params: Arc<Params>,

    state: Arc<Mutex<LoopState>>,
}

/// The state guarded by the handler's mutex.
struct LoopState {
    controller: PidController,

    /// True while the controller is engaged. Transitions only on an observed
    /// change of the enable signal.
    active: bool,

    /// Latest observed target velocity
    desired_velocity: f64,

    /// Latest observed measured velocity
    current_velocity: f64,

    /// Latest observed external clock value. This, not a local wall-clock
    /// read, is the time base for the PID computation, which keeps runs
    /// reproducible under simulated time sources.
    current_time: f64,

    /// Clock value of the previous published computation
    previous_time: f64,

    telemetry: TelemetryStore,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ControlLoopHandler {
    /// Create a new handler driving the given bus with the given parameters.
    ///
    /// The controller starts inactive, no computation happens until a true
    /// token arrives on the enable topic.
    pub fn new(bus: Arc<dyn MessageBus>, params: Params) -> Self {
        let controller = PidController::new(params.k_p, params.k_i, params.k_d);

        Self {
            bus,
            params: Arc::new(params),
            state: Arc::new(Mutex::new(LoopState {
                controller,
                active: false,
                desired_velocity: 0.0,
                current_velocity: 0.0,
                current_time: 0.0,
                previous_time: 0.0,
                telemetry: TelemetryStore::default(),
            })),
        }
    }

    /// Subscribe the event handlers to their topics on the bus.
    ///
    /// After this returns events are delivered on the bus's threads until
    /// the bus is shut down.
    pub fn start(&self) -> Result<(), CtrlLoopError> {
        let handler = self.clone();
        self.bus
            .subscribe(
                &self.params.clock_topic,
                Box::new(move |payload| handler.handle_clock(payload)),
            )
            .map_err(|e| CtrlLoopError::SubscribeError(self.params.clock_topic.clone(), e))?;
        info!("Clock subscriber started, waiting for data");

        let handler = self.clone();
        self.bus
            .subscribe(
                &self.params.current_velocity_topic,
                Box::new(move |payload| handler.handle_current_velocity(payload)),
            )
            .map_err(|e| {
                CtrlLoopError::SubscribeError(self.params.current_velocity_topic.clone(), e)
            })?;
        info!("Current velocity subscriber started, waiting for data");

        let handler = self.clone();
        self.bus
            .subscribe(
                &self.params.desired_velocity_topic,
                Box::new(move |payload| handler.handle_desired_velocity(payload)),
            )
            .map_err(|e| {
                CtrlLoopError::SubscribeError(self.params.desired_velocity_topic.clone(), e)
            })?;
        info!("Desired velocity subscriber started, waiting for data");

        let handler = self.clone();
        self.bus
            .subscribe(
                &self.params.enable_topic,
                Box::new(move |payload| handler.handle_enable(payload)),
            )
            .map_err(|e| CtrlLoopError::SubscribeError(self.params.enable_topic.clone(), e))?;
        info!("Enable/disable subscriber started, waiting for data");

        Ok(())
    }

    /// Handle a message on the clock topic.
    ///
    /// Unconditionally updates the external clock value.
    pub fn handle_clock(&self, payload: &str) {
        let value = match parse_real(payload) {
            Ok(v) => v,
            Err(e) => {
                warn!("Clock event dropped: {}", e);
                return;
            }
        };

        debug!("Received clock value {}", value);

        self.lock_state().current_time = value;
    }

    /// Handle a message on the desired velocity topic.
    ///
    /// Unconditionally updates the target velocity.
    pub fn handle_desired_velocity(&self, payload: &str) {
        let value = match parse_real(payload) {
            Ok(v) => v,
            Err(e) => {
                warn!("Desired velocity event dropped: {}", e);
                return;
            }
        };

        debug!("Received desired velocity {}", value);

        self.lock_state().desired_velocity = value;
    }

    /// Handle a message on the enable topic.
    ///
    /// The activation flag transitions only on an observed change of the
    /// signal, a re-affirmation of the current state is a no-op. Every
    /// transition resets the PID controller so no stale history crosses an
    /// activation boundary.
    pub fn handle_enable(&self, payload: &str) {
        let enable = match parse_bool_token(payload) {
            Ok(v) => v,
            Err(e) => {
                warn!("Enable/disable event dropped: {}", e);
                return;
            }
        };

        let mut state = self.lock_state();

        if enable && !state.active {
            state.active = true;
            state.controller.reset();
            info!("PID controller ACTIVATED at {}", Utc::now().to_rfc3339());
        } else if !enable && state.active {
            state.active = false;
            state.controller.reset();
            info!("PID controller DEACTIVATED at {}", Utc::now().to_rfc3339());
        }
    }

    /// Handle a message on the current velocity topic.
    ///
    /// Updates the measured velocity and, if the controller is active, runs
    /// one PID computation using the latest desired velocity and external
    /// clock value, publishes the acceleration demand and records a
    /// telemetry sample.
    ///
    /// A non-monotonic clock sample drops the computation (no publish, no
    /// telemetry) but is not fatal, the loop keeps accepting events.
    pub fn handle_current_velocity(&self, payload: &str) {
        let value = match parse_real(payload) {
            Ok(v) => v,
            Err(e) => {
                warn!("Current velocity event dropped: {}", e);
                return;
            }
        };

        debug!("Received current velocity {}", value);

        let mut state = self.lock_state();
        state.current_velocity = value;

        if !state.active {
            return;
        }

        let (desired, current, time) = (
            state.desired_velocity,
            state.current_velocity,
            state.current_time,
        );

        let acceleration = match state.controller.compute(desired, current, time) {
            Ok(a) => a,
            Err(e) => {
                warn!("Dropped computation: {}", e);
                return;
            }
        };

        if let Err(e) = self
            .bus
            .publish(&self.params.actuation_topic, &acceleration.to_string())
        {
            warn!("Could not publish the acceleration demand: {}", e);
        }

        state.telemetry.record(TelemetrySample {
            desired_velocity: desired,
            current_velocity: current,
            timestamp: time,
            acceleration,
        });

        debug!(
            "Acceleration {} published (delta time {} s)",
            acceleration,
            time - state.previous_time
        );
        state.previous_time = time;
    }

    /// Return whether the controller is currently active.
    pub fn is_active(&self) -> bool {
        self.lock_state().active
    }

    /// Number of telemetry samples recorded so far.
    pub fn num_telemetry_samples(&self) -> usize {
        self.lock_state().telemetry.len()
    }

    /// Finalize and persist the telemetry into the session directory.
    ///
    /// Writes the four per-field log files and the results plot, and returns
    /// the aligned sample count. Call after event delivery has stopped.
    pub fn finish(&self, session: &Session) -> Result<usize, CtrlLoopError> {
        let mut state = self.lock_state();

        let num_samples = state.telemetry.finalize();

        if num_samples == 0 {
            info!("No telemetry recorded, nothing to persist");
            return Ok(0);
        }

        state.telemetry.write_logs(&session.session_root)?;
        state
            .telemetry
            .render_plot(&session.session_root.join("results.png"))?;

        info!(
            "Persisted {} telemetry samples to {:?}",
            num_samples, session.session_root
        );

        Ok(num_samples)
    }

    /// Lock the shared state, recovering from a poisoned mutex.
    ///
    /// A panic in another handler must not silence the loop, the state
    /// itself is kept consistent by the handlers' no-partial-update
    /// discipline.
    fn lock_state(&self) -> MutexGuard<LoopState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Latest observed (desired velocity, current velocity, clock) snapshot.
    #[cfg(test)]
    fn input_snapshot(&self) -> (f64, f64, f64) {
        let state = self.lock_state();
        (
            state.desired_velocity,
            state.current_velocity,
            state.current_time,
        )
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use bus_if::net::{BusError, BusHandler};

    /// A bus which records published messages and ignores subscriptions,
    /// tests drive the handler methods directly.
    #[derive(Default)]
    struct RecordingBus {
        published: Mutex<Vec<(String, String)>>,
    }

    impl RecordingBus {
        fn published(&self) -> Vec<(String, String)> {
            self.published.lock().unwrap().clone()
        }
    }

    impl MessageBus for RecordingBus {
        fn subscribe(&self, _topic: &str, _handler: BusHandler) -> Result<(), BusError> {
            Ok(())
        }

        fn publish(&self, topic: &str, payload: &str) -> Result<(), BusError> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string()));
            Ok(())
        }
    }

    fn test_params() -> Params {
        Params {
            k_p: 1.0,
            k_i: 0.0,
            k_d: 0.0,
            clock_topic: "clock".into(),
            current_velocity_topic: "current_velocity".into(),
            desired_velocity_topic: "desired_velocity".into(),
            enable_topic: "enable".into(),
            actuation_topic: "actuation".into(),
        }
    }

    fn make_handler() -> (Arc<RecordingBus>, ControlLoopHandler) {
        let bus = Arc::new(RecordingBus::default());
        let handler = ControlLoopHandler::new(bus.clone(), test_params());
        (bus, handler)
    }

    #[test]
    fn test_inactive_events_do_nothing() {
        let (bus, handler) = make_handler();

        handler.handle_clock("1.0");
        handler.handle_desired_velocity("10.0");
        handler.handle_current_velocity("2.0");
        handler.handle_current_velocity("3.0");

        // Inactive: inputs tracked, but no publish and no telemetry
        assert!(!handler.is_active());
        assert!(bus.published().is_empty());
        assert_eq!(handler.num_telemetry_samples(), 0);
        assert_eq!(handler.input_snapshot(), (10.0, 3.0, 1.0));
    }

    #[test]
    fn test_active_computation_publishes_and_records() {
        let (bus, handler) = make_handler();

        handler.handle_enable("true");
        assert!(handler.is_active());

        handler.handle_desired_velocity("10.0");

        // Bootstrap sample
        handler.handle_clock("1.0");
        handler.handle_current_velocity("0.0");

        // Real sample: k_p = 1, error = 10
        handler.handle_clock("2.0");
        handler.handle_current_velocity("0.0");

        let published = bus.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0], ("actuation".to_string(), "0".to_string()));
        assert_eq!(published[1], ("actuation".to_string(), "10".to_string()));

        assert_eq!(handler.num_telemetry_samples(), 2);
    }

    #[test]
    fn test_redundant_enable_does_not_reset() {
        let (bus, handler) = make_handler();

        handler.handle_enable("on");
        handler.handle_desired_velocity("10.0");
        handler.handle_clock("1.0");
        handler.handle_current_velocity("0.0");

        // A second "enable" while already active must not reset the
        // controller, so the next sample is NOT a bootstrap
        handler.handle_enable("1");
        assert!(handler.is_active());

        handler.handle_clock("2.0");
        handler.handle_current_velocity("0.0");

        let published = bus.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].1, "10");
    }

    #[test]
    fn test_disable_stops_computation_and_resets() {
        let (bus, handler) = make_handler();

        handler.handle_enable("true");
        handler.handle_desired_velocity("10.0");
        handler.handle_clock("1.0");
        handler.handle_current_velocity("0.0");
        handler.handle_clock("2.0");
        handler.handle_current_velocity("0.0");

        handler.handle_enable("off");
        assert!(!handler.is_active());

        // No computation while inactive
        handler.handle_clock("3.0");
        handler.handle_current_velocity("0.0");
        assert_eq!(bus.published().len(), 2);

        // Re-activation starts from a clean bootstrap
        handler.handle_enable("true");
        handler.handle_clock("4.0");
        handler.handle_current_velocity("0.0");

        let published = bus.published();
        assert_eq!(published.len(), 3);
        assert_eq!(published[2].1, "0");
    }

    #[test]
    fn test_malformed_payloads_are_dropped() {
        let (bus, handler) = make_handler();

        handler.handle_enable("true");
        handler.handle_desired_velocity("10.0");
        handler.handle_clock("1.0");

        // Malformed payloads on every channel, none may panic or mutate
        handler.handle_enable("maybe");
        handler.handle_clock("abc");
        handler.handle_desired_velocity("");
        handler.handle_current_velocity("not-a-number");

        assert!(handler.is_active());
        assert_eq!(handler.input_snapshot(), (10.0, 0.0, 1.0));
        assert!(bus.published().is_empty());
        assert_eq!(handler.num_telemetry_samples(), 0);
    }

    #[test]
    fn test_non_monotonic_clock_drops_computation() {
        let (bus, handler) = make_handler();

        handler.handle_enable("true");
        handler.handle_desired_velocity("10.0");
        handler.handle_clock("5.0");
        handler.handle_current_velocity("0.0");

        // Clock goes backwards: computation dropped, loop keeps running
        handler.handle_clock("4.0");
        handler.handle_current_velocity("1.0");

        assert_eq!(bus.published().len(), 1);
        assert_eq!(handler.num_telemetry_samples(), 1);

        // Clock recovers, computation resumes
        handler.handle_clock("6.0");
        handler.handle_current_velocity("1.0");

        assert_eq!(bus.published().len(), 2);
        assert_eq!(bus.published()[1].1, "9");
        assert_eq!(handler.num_telemetry_samples(), 2);
    }

    #[test]
    fn test_each_active_sample_records_telemetry() {
        let (_bus, handler) = make_handler();

        handler.handle_enable("true");
        handler.handle_desired_velocity("10.0");
        for i in 1..=5 {
            handler.handle_clock(&format!("{}", i));
            handler.handle_current_velocity("0.0");
        }

        assert_eq!(handler.num_telemetry_samples(), 5);
    }
}
