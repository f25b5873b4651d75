//! # Message Bus Module
//!
//! This module provides the publish/subscribe abstraction the control loop is
//! driven by, together with the ZMQ-backed transport implementing it.
//!
//! The control loop only ever sees the [`MessageBus`] trait. Payloads are
//! single textual values; each message is framed as `"<topic> <payload>"` so
//! that subscribers can use ZMQ's prefix filtering on the topic.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
};

use log::warn;
use serde::Deserialize;

// Export zmq
pub use zmq;

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// A callback invoked for every payload arriving on a subscribed topic.
///
/// Handlers run on a delivery thread owned by the bus, potentially
/// concurrently with handlers for other topics, so they must run to
/// completion quickly and must not block.
pub type BusHandler = Box<dyn Fn(&str) + Send + 'static>;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// The publish/subscribe capability consumed by the control loop.
///
/// Implementations deliver each message arriving on a subscribed topic to the
/// registered handler, independently of the consumer's own control flow.
pub trait MessageBus: Send + Sync {
    /// Register a handler to be invoked for every message on `topic`.
    fn subscribe(&self, topic: &str, handler: BusHandler) -> Result<(), BusError>;

    /// Publish a textual payload on `topic`.
    fn publish(&self, topic: &str, payload: &str) -> Result<(), BusError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the ZMQ bus transport.
#[derive(Debug, Clone, Deserialize)]
pub struct BusParams {
    /// Endpoint the publishing socket connects to, for example
    /// `"tcp://localhost:5031"`.
    pub pub_endpoint: String,

    /// Endpoint subscriber sockets connect to, for example
    /// `"tcp://localhost:5030"`.
    pub sub_endpoint: String,

    /// Receive timeout for subscriber sockets in milliseconds. This bounds
    /// how long a receive thread can take to notice a shutdown request.
    pub recv_timeout_ms: i32,
}

/// A [`MessageBus`] implemented over ZMQ PUB/SUB sockets.
///
/// Each subscription gets its own SUB socket and receive thread, so handlers
/// for different topics may run concurrently. A single shared PUB socket,
/// guarded by a mutex, carries all outgoing messages.
pub struct ZmqBus {
    ctx: zmq::Context,

    params: BusParams,

    pub_socket: Mutex<zmq::Socket>,

    shutdown: Arc<AtomicBool>,

    join_handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum BusError {
    #[error("Error creating the socket: {0}")]
    CreateSocketError(zmq::Error),

    #[error("Could not connect the socket to {0}: {1}")]
    CouldNotConnect(String, zmq::Error),

    #[error("Could not set the {0} socket option: {1}")]
    SocketOptionError(String, zmq::Error),

    #[error("Could not send on topic {0}: {1}")]
    SendError(String, zmq::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ZmqBus {
    /// Create a new bus connected to the endpoints given in `params`.
    ///
    /// The publishing socket is connected immediately, subscriber sockets are
    /// created on [`MessageBus::subscribe`].
    pub fn new(params: &BusParams) -> Result<Self, BusError> {
        let ctx = zmq::Context::new();

        let pub_socket = ctx
            .socket(zmq::PUB)
            .map_err(BusError::CreateSocketError)?;

        pub_socket
            .set_linger(0)
            .map_err(|e| BusError::SocketOptionError("set_linger".into(), e))?;

        pub_socket
            .connect(&params.pub_endpoint)
            .map_err(|e| BusError::CouldNotConnect(params.pub_endpoint.clone(), e))?;

        Ok(Self {
            ctx,
            params: params.clone(),
            pub_socket: Mutex::new(pub_socket),
            shutdown: Arc::new(AtomicBool::new(false)),
            join_handles: Mutex::new(Vec::new()),
        })
    }

    /// Request all receive threads to stop and wait for them to exit.
    ///
    /// Called automatically on drop. Once shut down the bus will not deliver
    /// any further messages.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);

        let mut handles = match self.join_handles.lock() {
            Ok(h) => h,
            Err(_) => return,
        };

        for handle in handles.drain(..) {
            handle.join().ok();
        }
    }
}

impl MessageBus for ZmqBus {
    fn subscribe(&self, topic: &str, handler: BusHandler) -> Result<(), BusError> {
        let socket = self
            .ctx
            .socket(zmq::SUB)
            .map_err(BusError::CreateSocketError)?;

        // The receive timeout lets the receive thread poll the shutdown flag
        socket
            .set_rcvtimeo(self.params.recv_timeout_ms)
            .map_err(|e| BusError::SocketOptionError("set_rcvtimeo".into(), e))?;
        socket
            .set_linger(0)
            .map_err(|e| BusError::SocketOptionError("set_linger".into(), e))?;

        socket
            .connect(&self.params.sub_endpoint)
            .map_err(|e| BusError::CouldNotConnect(self.params.sub_endpoint.clone(), e))?;

        socket
            .set_subscribe(topic.as_bytes())
            .map_err(|e| BusError::SocketOptionError("set_subscribe".into(), e))?;

        let topic = topic.to_string();
        let shutdown = self.shutdown.clone();

        let handle = thread::spawn(move || recv_thread(socket, topic, handler, shutdown));

        match self.join_handles.lock() {
            Ok(mut handles) => handles.push(handle),
            Err(_) => warn!("Could not record the receive thread join handle"),
        }

        Ok(())
    }

    fn publish(&self, topic: &str, payload: &str) -> Result<(), BusError> {
        let frame = format!("{} {}", topic, payload);

        let socket = match self.pub_socket.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };

        socket
            .send(&frame, 0)
            .map_err(|e| BusError::SendError(topic.to_string(), e))
    }
}

impl Drop for ZmqBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Receive loop for a single subscription.
///
/// Strips the topic prefix from each frame and hands the payload to the
/// handler. Runs until the shutdown flag is raised.
fn recv_thread(socket: zmq::Socket, topic: String, handler: BusHandler, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Relaxed) {
        let msg = match socket.recv_string(0) {
            Ok(Ok(m)) => m,
            Ok(Err(_)) => {
                warn!("Dropping non-UTF8 message on topic {}", topic);
                continue;
            }
            // EAGAIN is the receive timeout elapsing, go round and check the
            // shutdown flag
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => {
                warn!("Receive error on topic {}: {}", topic, e);
                continue;
            }
        };

        // Frames are "<topic> <payload>". Prefix filtering has already
        // matched the topic, the payload is everything after the first space.
        let payload = match msg.splitn(2, ' ').nth(1) {
            Some(p) => p,
            None => {
                warn!("Dropping frame with no payload on topic {}", topic);
                continue;
            }
        };

        handler(payload);
    }
}
