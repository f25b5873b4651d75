//! Simple loopback subscriber test
//!
//! Binds the endpoint `pid_exec` publishes to and prints every actuation
//! command the controller emits.

use bus_if::net::zmq;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Create context and a SUB socket bound for the controller to connect to
    let ctx = zmq::Context::new();
    let socket = ctx.socket(zmq::SUB)?;
    socket.bind("tcp://*:5031")?;

    // Filter on the actuation output topic
    socket.set_subscribe(b"control/command/actuation_cmd")?;

    println!("Actuation subscriber open on port 5031");

    loop {
        let msg = socket.recv_msg(0)?;

        println!("Got message: {:?}", msg.as_str());
    }
}
