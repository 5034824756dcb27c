//! The `track` and `monitor` subcommands: run the loop, stream JSONL.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use axle_core::error::Result;
use axle_core::{Event, MotionSystem};

use crate::rt::setup_rt_once;

/// Set by the SIGINT handler; every long-running command polls it.
pub static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
pub fn install_sigint_handler() {
    extern "C" fn on_sigint(_: libc::c_int) {
        SHUTDOWN.store(true, Ordering::SeqCst);
    }
    unsafe {
        libc::signal(libc::SIGINT, on_sigint as libc::sighandler_t);
    }
}

#[cfg(not(unix))]
pub fn install_sigint_handler() {}

pub struct TrackParams {
    pub target_rpm: f64,
    pub control_pin: u8,
    pub sensor_pin: u8,
    pub sensor_id: u8,
    pub seconds: f64,
    pub rt: bool,
    pub rt_prio: Option<i32>,
}

/// Run the closed loop for the requested duration, emitting one JSON line
/// per controller tick and a final summary line.
pub fn run_track(system: &MotionSystem, params: &TrackParams) -> Result<()> {
    setup_rt_once(params.rt, params.rt_prio);

    let stream = system.subscribe();
    system.sensor_enable(params.sensor_id, params.sensor_pin)?;
    system.rpm_start(params.target_rpm, params.control_pin, params.sensor_id)?;
    tracing::info!(
        target_rpm = params.target_rpm,
        control_pin = params.control_pin,
        sensor_pin = params.sensor_pin,
        "tracking"
    );

    let started = Instant::now();
    let deadline = started + Duration::from_secs_f64(params.seconds.max(0.0));
    let mut ticks: u64 = 0;
    let mut final_rpm = 0.0f64;
    while Instant::now() < deadline && !SHUTDOWN.load(Ordering::Relaxed) {
        match stream.next_timeout(Duration::from_millis(200)) {
            Some(Event::ControllerStatus(s)) => {
                ticks += 1;
                final_rpm = s.current_rpm;
                match serde_json::to_string(&s) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "telemetry serialization failed"),
                }
            }
            Some(_) | None => {}
        }
    }

    let aborted = SHUTDOWN.load(Ordering::Relaxed);
    system.rpm_stop()?;
    let summary = serde_json::json!({
        "target_rpm": params.target_rpm,
        "final_rpm": final_rpm,
        "ticks": ticks,
        "duration_ms": started.elapsed().as_millis() as u64,
        "aborted": aborted,
    });
    println!("{summary}");
    Ok(())
}

/// Watch raw pulse telemetry from one sensor.
pub fn run_monitor(system: &MotionSystem, sensor_id: u8, sensor_pin: u8, seconds: f64) -> Result<()> {
    let stream = system.subscribe();
    system.sensor_enable(sensor_id, sensor_pin)?;
    tracing::info!(sensor_id, sensor_pin, "monitoring");

    let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
    while Instant::now() < deadline && !SHUTDOWN.load(Ordering::Relaxed) {
        match stream.next_timeout(Duration::from_millis(200)) {
            Some(Event::PulseObserved(p)) => match serde_json::to_string(&p) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "telemetry serialization failed"),
            },
            Some(_) | None => {}
        }
    }
    system.sensor_disable(sensor_id)?;
    Ok(())
}
