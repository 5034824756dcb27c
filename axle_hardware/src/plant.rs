//! First-order motor + encoder model against the simulation backend.
//!
//! The plant thread reads the duty currently written to the drive pin,
//! relaxes the modeled speed toward `rpm_per_duty * duty` with time
//! constant `tau_s`, and injects rising edges on the sensor pin at the
//! modeled pulse rate. Below the break-away duty a stalled motor stays
//! stalled, which is what makes the controller's feed-forward kick
//! observable end to end without hardware.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use axle_traits::Level;

use crate::sim::SimBackend;

/// Modeled speed below which a motor under the break-away duty is
/// considered stalled.
const STALL_FLOOR_RPM: f64 = 1.0;

/// Integration step for the plant thread.
const STEP_MS: u64 = 2;

#[derive(Debug, Clone)]
pub struct SpinPlantCfg {
    /// Steady-state RPM per duty count (255 * 0.8 = 204 RPM flat out).
    pub rpm_per_duty: f64,
    /// First-order time constant of the motor + load, seconds.
    pub tau_s: f64,
    /// Minimum duty that breaks static friction from a standstill.
    pub breakaway_duty: u8,
    /// Encoder pulses per shaft rotation.
    pub pulses_per_rotation: f64,
}

impl Default for SpinPlantCfg {
    fn default() -> Self {
        Self {
            rpm_per_duty: 0.8,
            tau_s: 0.25,
            breakaway_duty: 6,
            pulses_per_rotation: 45.0,
        }
    }
}

impl SpinPlantCfg {
    /// Apply the `AXLE_TEST_RPM_PER_DUTY` env override on top of this
    /// config. Integration tests use it to speed convergence up.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("AXLE_TEST_RPM_PER_DUTY")
            && let Ok(parsed) = v.parse::<f64>()
            && parsed.is_finite()
            && parsed > 0.0
        {
            self.rpm_per_duty = parsed;
        }
        self
    }
}

/// Running plant model; the thread stops when the handle is dropped.
pub struct SpinPlant {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SpinPlant {
    pub fn spawn(backend: Arc<SimBackend>, drive_pin: u8, sensor_pin: u8, cfg: SpinPlantCfg) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_bg = stop.clone();
        let handle = thread::spawn(move || {
            let dt = STEP_MS as f64 / 1000.0;
            let mut rpm = 0.0_f64;
            let mut phase = 0.0_f64;
            while !stop_bg.load(Ordering::Relaxed) {
                let duty = backend.duty(drive_pin).unwrap_or(0);
                let spinning = rpm > STALL_FLOOR_RPM;
                let target = if duty >= cfg.breakaway_duty || spinning {
                    cfg.rpm_per_duty * f64::from(duty)
                } else {
                    0.0
                };
                let tau = cfg.tau_s.max(dt);
                rpm += (target - rpm) * (dt / tau);
                if rpm < 0.0 {
                    rpm = 0.0;
                }

                let pps = rpm * cfg.pulses_per_rotation / 60.0;
                phase += pps * dt;
                while phase >= 1.0 {
                    backend.inject_edge(sensor_pin, Level::High);
                    phase -= 1.0;
                }

                thread::sleep(Duration::from_millis(STEP_MS));
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop the model thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for SpinPlant {
    fn drop(&mut self) {
        self.shutdown();
    }
}
