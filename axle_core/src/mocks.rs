//! Test and helper doubles for axle_core.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axle_traits::Clock;

use crate::controller::{Actuator, Tachometer};
use crate::error::{MotionError, Result};

/// Test clock driven by an explicit microsecond offset from a fixed
/// origin.
///
/// Only `advance` moves simulated time. `sleep` parks the caller for a
/// moment of real time without moving it, so a background ticker running
/// on this clock never reaches its deadline (and stays promptly joinable)
/// while tests fire control ticks by hand.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset_us: Arc<AtomicU64>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_us: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, d: Duration) {
        let us = d.as_micros().min(u128::from(u64::MAX)) as u64;
        self.offset_us.fetch_add(us, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_micros(self.offset_us.load(Ordering::Relaxed))
    }

    fn sleep(&self, _d: Duration) {
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Scriptable tachometer: tests set the reading the controller will see.
#[derive(Default)]
pub struct ScriptedTach {
    enabled: AtomicBool,
    rpm: Mutex<Option<f64>>,
}

impl ScriptedTach {
    pub fn new_enabled() -> Self {
        let t = Self::default();
        t.enabled.store(true, Ordering::Relaxed);
        t
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Script the filtered reading; `None` models an unknown sensor id.
    pub fn set_rpm(&self, rpm: Option<f64>) {
        *self.rpm.lock().unwrap_or_else(|e| e.into_inner()) = rpm;
    }
}

impl Tachometer for ScriptedTach {
    fn enabled(&self, _sensor_id: u8) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn filtered_rpm(&self, _sensor_id: u8) -> Option<f64> {
        *self.rpm.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reset_filter(&self, _sensor_id: u8) {
        let mut rpm = self.rpm.lock().unwrap_or_else(|e| e.into_inner());
        if rpm.is_some() {
            *rpm = Some(0.0);
        }
    }
}

/// Actuator spy that records every duty write, with an optional failure
/// switch for error-path tests.
#[derive(Default)]
pub struct RecordingActuator {
    writes: Mutex<Vec<(u8, u8)>>,
    fail: AtomicBool,
}

impl RecordingActuator {
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn writes(&self) -> Vec<(u8, u8)> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn last_duty(&self, pin: u8) -> Option<u8> {
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|(p, _)| *p == pin)
            .map(|(_, d)| *d)
    }
}

impl Actuator for RecordingActuator {
    fn apply_duty(&self, pin: u8, duty: u8) -> Result<()> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(MotionError::Resource("injected actuator failure".into()).into());
        }
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((pin, duty));
        Ok(())
    }
}
