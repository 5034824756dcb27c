//! PWM output registry.
//!
//! Tracks every pin the process currently drives, validates commands before
//! any backend call, and keeps backend writes idempotent. Each successful
//! mutation publishes a [`PwmUpdated`] event after the entry lock is
//! released.

use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;
use std::sync::{Arc, Mutex};

use axle_traits::{GpioBackend, PwmOutput};

use crate::bus::{Event, EventBus, PwmUpdated};
use crate::claims::{PinClaims, PinRole};
use crate::controller::Actuator;
use crate::error::{MotionError, Result};
use crate::status::PwmStatus;
use crate::util::validate_pin;

pub const DUTY_MAX: u16 = 255;
pub const FREQ_MIN_HZ: u32 = 1;
pub const FREQ_MAX_HZ: u32 = 8000;

struct PwmEntry {
    duty: u8,
    frequency_hz: u32,
    enabled: bool,
    output: Box<dyn PwmOutput>,
}

pub struct PwmRegistry {
    backend: Arc<dyn GpioBackend>,
    bus: Arc<EventBus>,
    claims: Arc<PinClaims>,
    entries: Mutex<HashMap<u8, PwmEntry>>,
}

impl PwmRegistry {
    pub fn new(backend: Arc<dyn GpioBackend>, bus: Arc<EventBus>, claims: Arc<PinClaims>) -> Self {
        Self {
            backend,
            bus,
            claims,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Actuate or update a pin. `duty` is 8-bit (the u16 parameter exists so
    /// out-of-range transport values reach validation instead of being
    /// truncated); `enabled=false` or `duty=0` drives the line low but
    /// retains the entry.
    pub fn set(&self, pin: u8, duty: u16, frequency_hz: u32, enabled: bool) -> Result<()> {
        validate_pin(pin)?;
        if duty > DUTY_MAX {
            return Err(MotionError::Validation(format!(
                "duty {duty} out of range (0-{DUTY_MAX})"
            ))
            .into());
        }
        if !(FREQ_MIN_HZ..=FREQ_MAX_HZ).contains(&frequency_hz) {
            return Err(MotionError::Validation(format!(
                "frequency {frequency_hz} Hz out of range ({FREQ_MIN_HZ}-{FREQ_MAX_HZ})"
            ))
            .into());
        }
        let applied_duty = if enabled { duty as u8 } else { 0 };

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.entry(pin) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                // Idempotent at the backend: only changed values are written.
                if entry.frequency_hz != frequency_hz {
                    entry
                        .output
                        .set_frequency(frequency_hz)
                        .map_err(|e| MotionError::Resource(format!("set frequency on pin {pin}: {e}")))?;
                    entry.frequency_hz = frequency_hz;
                }
                if entry.duty != applied_duty {
                    entry
                        .output
                        .write_duty(applied_duty)
                        .map_err(|e| MotionError::Resource(format!("write duty on pin {pin}: {e}")))?;
                    entry.duty = applied_duty;
                }
                entry.enabled = enabled;
            }
            MapEntry::Vacant(vacant) => {
                self.claims.claim(pin, PinRole::PwmOutput)?;
                let mut output = match self.backend.open_output(pin) {
                    Ok(o) => o,
                    Err(e) => {
                        self.claims.release(pin);
                        return Err(
                            MotionError::Resource(format!("open output pin {pin}: {e}")).into()
                        );
                    }
                };
                let init = output
                    .set_frequency(frequency_hz)
                    .and_then(|()| {
                        if applied_duty > 0 {
                            output.write_duty(applied_duty)
                        } else {
                            Ok(())
                        }
                    });
                if let Err(e) = init {
                    drop(output);
                    self.claims.release(pin);
                    return Err(
                        MotionError::Resource(format!("program output pin {pin}: {e}")).into()
                    );
                }
                vacant.insert(PwmEntry {
                    duty: applied_duty,
                    frequency_hz,
                    enabled,
                    output,
                });
            }
        }
        drop(entries);

        tracing::debug!(pin, duty = applied_duty, frequency_hz, enabled, "pwm set");
        self.bus.publish(Event::PwmUpdated(PwmUpdated {
            pin,
            duty: applied_duty,
            frequency_hz,
        }));
        Ok(())
    }

    /// Drive a pin low and release it. Unknown pins are a precondition
    /// failure. The entry is removed even when the final write fails; a
    /// half-released line is worse than a surfaced error.
    pub fn stop(&self, pin: u8) -> Result<()> {
        validate_pin(pin)?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let Some(mut entry) = entries.remove(&pin) else {
            return Err(
                MotionError::Precondition(format!("pin {pin} has no active pwm entry")).into(),
            );
        };
        let write = entry.output.write_duty(0);
        let frequency_hz = entry.frequency_hz;
        drop(entry.output);
        self.claims.release(pin);
        drop(entries);

        tracing::debug!(pin, "pwm stopped");
        self.bus.publish(Event::PwmUpdated(PwmUpdated {
            pin,
            duty: 0,
            frequency_hz,
        }));
        write.map_err(|e| MotionError::Resource(format!("drive pin {pin} low: {e}")).into())
    }

    /// Stop every entry; returns the pins that were active. Write failures
    /// are logged and do not abort the sweep.
    pub fn stop_all(&self) -> Vec<u8> {
        let mut events: Vec<PwmUpdated> = Vec::new();
        {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            for (pin, mut entry) in entries.drain() {
                if let Err(e) = entry.output.write_duty(0) {
                    tracing::warn!(pin, error = %e, "drive-low failed during stop_all");
                }
                let frequency_hz = entry.frequency_hz;
                drop(entry.output);
                self.claims.release(pin);
                events.push(PwmUpdated {
                    pin,
                    duty: 0,
                    frequency_hz,
                });
            }
        }
        events.sort_unstable_by_key(|e| e.pin);
        let mut stopped: Vec<u8> = Vec::with_capacity(events.len());
        for ev in events {
            stopped.push(ev.pin);
            self.bus.publish(Event::PwmUpdated(ev));
        }
        if !stopped.is_empty() {
            tracing::info!(pins = ?stopped, "all pwm outputs stopped");
        }
        stopped
    }

    /// Snapshot of every entry, ordered by pin.
    pub fn status(&self) -> Vec<PwmStatus> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<PwmStatus> = entries
            .iter()
            .map(|(&pin, e)| PwmStatus {
                pin,
                duty: e.duty,
                frequency_hz: e.frequency_hz,
                enabled: e.enabled,
            })
            .collect();
        out.sort_unstable_by_key(|s| s.pin);
        out
    }
}

impl Drop for PwmRegistry {
    fn drop(&mut self) {
        // Shutdown backstop: no line stays driven past the registry.
        let _ = self.stop_all();
    }
}

/// Narrow actuation capability handed to the controller: one duty write at
/// the configured carrier frequency.
pub struct ControlOutput {
    registry: Arc<PwmRegistry>,
    frequency_hz: u32,
}

impl ControlOutput {
    pub fn new(registry: Arc<PwmRegistry>, frequency_hz: u32) -> Self {
        Self {
            registry,
            frequency_hz,
        }
    }
}

impl Actuator for ControlOutput {
    fn apply_duty(&self, pin: u8, duty: u8) -> Result<()> {
        self.registry
            .set(pin, u16::from(duty), self.frequency_hz, true)
    }
}
