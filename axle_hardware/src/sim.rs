//! Simulation backend: satisfies the GPIO contract with no physical effect.
//!
//! Output writes are recorded (current value plus full history per pin) so
//! tests and the [`crate::plant::SpinPlant`] can observe actuation. Input
//! edges are never produced spontaneously; they arrive only through
//! [`SimBackend::inject_edge`] / [`SimBackend::inject_edge_at`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axle_traits::{Clock, EdgeCallback, EdgeInput, GpioBackend, HwDynError, Level, MonotonicClock, PwmOutput};

use crate::error::HwError;

#[derive(Debug, Clone)]
struct OutputState {
    duty: u8,
    frequency_hz: u32,
}

type Outputs = Arc<Mutex<HashMap<u8, OutputState>>>;
type Callbacks = Arc<Mutex<HashMap<u8, EdgeCallback>>>;
type History = Arc<Mutex<HashMap<u8, Vec<u8>>>>;

/// In-process GPIO double. Cheap to share: hand the system an
/// `Arc<SimBackend>` coerced to `Arc<dyn GpioBackend>` and keep a clone for
/// injection and inspection.
pub struct SimBackend {
    epoch: Instant,
    outputs: Outputs,
    callbacks: Callbacks,
    history: History,
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBackend {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            outputs: Arc::new(Mutex::new(HashMap::new())),
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            history: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Current duty of an open output pin.
    pub fn duty(&self, pin: u8) -> Option<u8> {
        self.outputs.lock().ok()?.get(&pin).map(|o| o.duty)
    }

    /// Current frequency of an open output pin.
    pub fn frequency(&self, pin: u8) -> Option<u32> {
        self.outputs.lock().ok()?.get(&pin).map(|o| o.frequency_hz)
    }

    /// Every duty value ever written to `pin`, oldest first. Survives the
    /// output handle being released.
    pub fn duty_history(&self, pin: u8) -> Vec<u8> {
        self.history
            .lock()
            .ok()
            .and_then(|h| h.get(&pin).cloned())
            .unwrap_or_default()
    }

    pub fn output_open(&self, pin: u8) -> bool {
        self.outputs.lock().map(|o| o.contains_key(&pin)).unwrap_or(false)
    }

    pub fn input_open(&self, pin: u8) -> bool {
        self.callbacks.lock().map(|c| c.contains_key(&pin)).unwrap_or(false)
    }

    /// Deliver one edge to the callback registered on `pin`, stamped with
    /// the backend's own monotonic tick. Returns false when no input is
    /// open on that pin.
    pub fn inject_edge(&self, pin: u8, level: Level) -> bool {
        let tick_us = MonotonicClock::new().us_since(self.epoch);
        self.inject_edge_at(pin, level, tick_us)
    }

    /// Deliver one edge with an explicit microsecond tick. Debounce and
    /// window tests use this for exact spacing.
    pub fn inject_edge_at(&self, pin: u8, level: Level, tick_us: u64) -> bool {
        let Ok(mut cbs) = self.callbacks.lock() else {
            return false;
        };
        match cbs.get_mut(&pin) {
            Some(cb) => {
                cb(level, tick_us);
                true
            }
            None => false,
        }
    }

    fn pin_free(&self, pin: u8) -> Result<(), HwError> {
        let outputs_hold = self.outputs.lock().map(|o| o.contains_key(&pin)).unwrap_or(false);
        let inputs_hold = self.callbacks.lock().map(|c| c.contains_key(&pin)).unwrap_or(false);
        if outputs_hold || inputs_hold {
            return Err(HwError::PinInUse(pin));
        }
        Ok(())
    }
}

impl GpioBackend for SimBackend {
    fn open_output(&self, pin: u8) -> Result<Box<dyn PwmOutput>, HwDynError> {
        self.pin_free(pin)?;
        if let Ok(mut outputs) = self.outputs.lock() {
            outputs.insert(
                pin,
                OutputState {
                    duty: 0,
                    frequency_hz: 0,
                },
            );
        }
        Ok(Box::new(SimPwm {
            pin,
            outputs: self.outputs.clone(),
            history: self.history.clone(),
        }))
    }

    fn open_input(&self, pin: u8, on_edge: EdgeCallback) -> Result<Box<dyn EdgeInput>, HwDynError> {
        self.pin_free(pin)?;
        if let Ok(mut cbs) = self.callbacks.lock() {
            cbs.insert(pin, on_edge);
        }
        Ok(Box::new(SimInput {
            pin,
            callbacks: self.callbacks.clone(),
        }))
    }

    fn simulated(&self) -> bool {
        true
    }
}

struct SimPwm {
    pin: u8,
    outputs: Outputs,
    history: History,
}

impl std::fmt::Debug for SimPwm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimPwm").field("pin", &self.pin).finish()
    }
}

impl PwmOutput for SimPwm {
    fn set_frequency(&mut self, hz: u32) -> Result<(), HwDynError> {
        if let Ok(mut outputs) = self.outputs.lock()
            && let Some(o) = outputs.get_mut(&self.pin)
        {
            o.frequency_hz = hz;
        }
        Ok(())
    }

    fn write_duty(&mut self, duty: u8) -> Result<(), HwDynError> {
        if let Ok(mut outputs) = self.outputs.lock()
            && let Some(o) = outputs.get_mut(&self.pin)
        {
            o.duty = duty;
        }
        if let Ok(mut history) = self.history.lock() {
            history.entry(self.pin).or_default().push(duty);
        }
        Ok(())
    }
}

impl Drop for SimPwm {
    fn drop(&mut self) {
        if let Ok(mut outputs) = self.outputs.lock() {
            outputs.remove(&self.pin);
        }
    }
}

struct SimInput {
    pin: u8,
    callbacks: Callbacks,
}

impl std::fmt::Debug for SimInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimInput").field("pin", &self.pin).finish()
    }
}

impl EdgeInput for SimInput {
    fn pin(&self) -> u8 {
        self.pin
    }
}

impl Drop for SimInput {
    fn drop(&mut self) {
        if let Ok(mut cbs) = self.callbacks.lock() {
            cbs.remove(&self.pin);
        }
    }
}
