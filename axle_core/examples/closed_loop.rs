//! Closed-loop demo: the RPM controller tracking a simulated drivetrain.
//!
//! A SpinPlant thread models the motor and injects encoder edges; the
//! controller runs its real 100 ms tick and the demo prints one status
//! line per tick.
//!
//! Run with `cargo run --example closed_loop`.

use std::sync::Arc;
use std::time::Duration;

use axle_core::{Event, MotionSystem, SystemCfg};
use axle_hardware::{SimBackend, SpinPlant, SpinPlantCfg};
use axle_traits::GpioBackend;

fn main() -> Result<(), eyre::Report> {
    let sim = Arc::new(SimBackend::new());
    let backend: Arc<dyn GpioBackend> = sim.clone();
    let system = MotionSystem::new(backend, SystemCfg::default())?;
    let stream = system.subscribe();

    system.sensor_enable(1, 21)?;
    let plant = SpinPlant::spawn(sim, 18, 21, SpinPlantCfg::default());

    system.rpm_start(60.0, 18, 1)?;
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if let Some(Event::ControllerStatus(s)) = stream.next_timeout(Duration::from_millis(200)) {
            println!(
                "target={:6.1} rpm={:6.1} err={:6.1} pwm={:3}",
                s.target_rpm, s.current_rpm, s.error, s.current_pwm
            );
        }
    }

    system.rpm_stop()?;
    plant.stop();
    system.shutdown();
    Ok(())
}
