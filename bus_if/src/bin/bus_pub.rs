//! Simple loopback publisher test
//!
//! Binds the endpoint `pid_exec` subscribes to and drives the controller's
//! input topics with a synthetic clock and a velocity ramp, engaging the
//! controller after the first second. Useful for exercising the control loop
//! without a vehicle or simulator on the bus.

use bus_if::net::zmq;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Create zmq context and a PUB socket bound for subscribers to connect to
    let ctx = zmq::Context::new();
    let socket = ctx.socket(zmq::PUB)?;
    socket.bind("tcp://*:5030")?;

    println!("Input publisher open on port 5030");

    // Give late subscribers a chance to connect before data starts flowing
    std::thread::sleep(std::time::Duration::from_millis(500));

    let mut time_s = 0.0f64;
    let mut velocity_kph = 0.0f64;
    let target_kph = 50.0f64;
    let mut engaged = false;

    loop {
        time_s += 0.1;

        // Crude plant: velocity relaxes towards the target so the controller
        // has something sensible to chase
        velocity_kph += (target_kph - velocity_kph) * 0.02;

        // Frames are "<topic> <payload>", the first space-separated part is
        // the topic subscribers filter on
        socket.send(&format!("vehicle/status/clock_status {}", time_s), 0)?;
        socket.send(&format!("vehicle/status/velocity_status {}", velocity_kph), 0)?;
        socket.send(&format!("adas/cruise_control/target_speed {}", target_kph), 0)?;

        // Engage the controller once the clock has been running for a second
        if !engaged && time_s >= 1.0 {
            socket.send("adas/cruise_control/engage on", 0)?;
            engaged = true;
            println!("Engage sent at t = {:.1} s", time_s);
        }

        std::thread::sleep(std::time::Duration::from_millis(100));
    }
}
