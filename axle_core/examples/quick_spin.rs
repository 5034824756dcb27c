//! Quick Start Example
//!
//! Drives one PWM pin through the registry against the simulation backend
//! and watches the resulting telemetry on the event bus.
//!
//! Run with `cargo run --example quick_spin`.

use std::sync::Arc;

use axle_core::{Event, MotionSystem, SystemCfg};
use axle_hardware::SimBackend;
use axle_traits::GpioBackend;

fn main() -> Result<(), eyre::Report> {
    let sim = Arc::new(SimBackend::new());
    let backend: Arc<dyn GpioBackend> = sim.clone();
    let system = MotionSystem::new(backend, SystemCfg::default())?;
    let stream = system.subscribe();

    // Ramp pin 18 up and back down.
    for duty in [32u16, 96, 192, 255, 128, 0] {
        system.pwm_set(18, duty, 1000, true)?;
    }
    println!("registry: {:?}", system.pwm_status());

    let stopped = system.pwm_stop_all();
    println!("stopped pins: {stopped:?}");

    for event in stream.drain() {
        if let Event::PwmUpdated(p) = event {
            println!("pwm_updated pin={} duty={} freq={}", p.pin, p.duty, p.frequency_hz);
        }
    }
    Ok(())
}
