//! Encoder sensor pipeline.
//!
//! One slot per sensor id: a debounced pulse counter, a rolling window of
//! accepted edge ticks, and an EMA-filtered RPM estimate. The edge callback
//! registered with the GPIO backend runs the whole per-edge step and must
//! stay well under the shortest expected inter-pulse interval, so it does
//! no allocation beyond the window ring and publishes outside the state
//! lock.
//!
//! Rate math: a 1 s window with a 25 ms lower bound keeps the estimate
//! stable at a few pulses per second without lagging at high speed; the
//! EMA smooths quantization on top. A sensor that goes quiet holds its
//! last filtered value; staleness is the controller's concern, not the
//! pipeline's.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axle_traits::{EdgeInput, GpioBackend, Level};

use crate::bus::{Event, EventBus, PulseObserved, PulseSource, SensorState as SensorStateEvent};
use crate::claims::{PinClaims, PinRole};
use crate::config::EncoderCfg;
use crate::controller::Tachometer;
use crate::error::{MotionError, Result};
use crate::status::SensorSnapshot;
use crate::util::{validate_pin, wall_ms};

/// Per-sensor pipeline state, shared between the bank and the edge callback.
pub(crate) struct SensorCore {
    sensor_id: u8,
    pin: u8,
    enabled: bool,
    pulse_count: u64,
    last_edge_tick_us: Option<u64>,
    window: VecDeque<u64>,
    instant_rate_pps: f64,
    filtered_rpm: Option<f64>,
    last_pulse_wall_ms: Option<u64>,
    source: PulseSource,
    cfg: EncoderCfg,
}

impl SensorCore {
    fn new(sensor_id: u8, pin: u8, source: PulseSource, cfg: EncoderCfg) -> Self {
        Self {
            sensor_id,
            pin,
            enabled: false,
            pulse_count: 0,
            last_edge_tick_us: None,
            window: VecDeque::new(),
            instant_rate_pps: 0.0,
            filtered_rpm: None,
            last_pulse_wall_ms: None,
            source,
            cfg,
        }
    }

    /// Process one electrical edge. Returns the telemetry payload when the
    /// edge was accepted; the caller publishes it outside the lock.
    pub(crate) fn on_edge(&mut self, level: Level, tick_us: u64, wall_ms: u64) -> Option<PulseObserved> {
        if !self.enabled || level != Level::High {
            return None;
        }
        // Debounce: also rejects non-monotonic ticks, which keeps the
        // window strictly increasing.
        if let Some(last) = self.last_edge_tick_us
            && tick_us.saturating_sub(last) < self.cfg.debounce_us
        {
            return None;
        }

        self.last_edge_tick_us = Some(tick_us);
        self.pulse_count += 1;
        self.last_pulse_wall_ms = Some(wall_ms);

        self.window.push_back(tick_us);
        while let Some(&front) = self.window.front() {
            if tick_us - front > self.cfg.window_us {
                self.window.pop_front();
            } else {
                break;
            }
        }

        if self.window.len() >= 2
            && let (Some(&first), Some(&last)) = (self.window.front(), self.window.back())
        {
            let span_us = last - first;
            if span_us >= self.cfg.min_window_us {
                let pps = (self.window.len() - 1) as f64 * 1_000_000.0 / span_us as f64;
                let instant_rpm = pps * 60.0 / self.cfg.pulses_per_rotation;
                let alpha = self.cfg.filter_alpha;
                let prev = self.filtered_rpm.unwrap_or(instant_rpm);
                self.filtered_rpm = Some(prev * (1.0 - alpha) + instant_rpm * alpha);
                self.instant_rate_pps = pps;
            }
            // Too-short window: keep the previous estimate rather than
            // collapsing to zero while pulses keep arriving.
        }

        Some(PulseObserved {
            sensor_id: self.sensor_id,
            pin: self.pin,
            pulse_count: self.pulse_count,
            rate_pps: self.instant_rate_pps,
            filtered_rpm: self.filtered_rpm.unwrap_or(0.0),
            wall_ms,
            source: self.source,
        })
    }

    fn reset(&mut self) {
        self.pulse_count = 0;
        self.window.clear();
        self.instant_rate_pps = 0.0;
        self.filtered_rpm = None;
    }

    fn reset_filter(&mut self) {
        self.window.clear();
        self.instant_rate_pps = 0.0;
        self.filtered_rpm = None;
    }

    fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            sensor_id: self.sensor_id,
            pin: self.pin,
            enabled: self.enabled,
            pulse_count: self.pulse_count,
            rate_pps: self.instant_rate_pps,
            filtered_rpm: self.filtered_rpm.unwrap_or(0.0),
            last_pulse_wall_ms: self.last_pulse_wall_ms,
        }
    }
}

struct Slot {
    pin: u8,
    core: Arc<Mutex<SensorCore>>,
    input: Option<Box<dyn EdgeInput>>,
}

pub struct EncoderBank {
    backend: Arc<dyn GpioBackend>,
    bus: Arc<EventBus>,
    claims: Arc<PinClaims>,
    cfg: EncoderCfg,
    slots: Mutex<HashMap<u8, Slot>>,
}

impl EncoderBank {
    pub fn new(
        backend: Arc<dyn GpioBackend>,
        bus: Arc<EventBus>,
        claims: Arc<PinClaims>,
        cfg: EncoderCfg,
    ) -> Self {
        Self {
            backend,
            bus,
            claims,
            cfg,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Open `pin` as this sensor's input and start counting. Re-enabling on
    /// the same pin is a no-op; on a different pin the sensor re-routes
    /// atomically, preserving its historical pulse count.
    pub fn enable(&self, sensor_id: u8, pin: u8) -> Result<()> {
        validate_pin(pin)?;
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(slot) = slots.get_mut(&sensor_id)
            && slot.input.is_some()
        {
            if slot.pin == pin {
                return Ok(());
            }
            // Re-route: secure the new pin before giving up the old one so
            // a conflict leaves the sensor untouched.
            self.claims.claim(pin, PinRole::EncoderInput)?;
            Self::detach(&self.claims, slot);
        } else {
            self.claims.claim(pin, PinRole::EncoderInput)?;
        }
        let source = if self.backend.simulated() {
            PulseSource::Simulation
        } else {
            PulseSource::HardwareInterrupt
        };

        let core = match slots.get(&sensor_id) {
            Some(slot) => slot.core.clone(),
            None => Arc::new(Mutex::new(SensorCore::new(
                sensor_id,
                pin,
                source,
                self.cfg.clone(),
            ))),
        };
        {
            let mut c = core.lock().unwrap_or_else(|e| e.into_inner());
            c.pin = pin;
            c.source = source;
            c.enabled = true;
        }

        let cb_core = core.clone();
        let cb_bus = self.bus.clone();
        let input = match self.backend.open_input(
            pin,
            Box::new(move |level, tick_us| {
                let stamp = wall_ms();
                let pulse = {
                    let mut c = cb_core.lock().unwrap_or_else(|e| e.into_inner());
                    c.on_edge(level, tick_us, stamp)
                };
                if let Some(p) = pulse {
                    cb_bus.publish(Event::PulseObserved(p));
                }
            }),
        ) {
            Ok(i) => i,
            Err(e) => {
                self.claims.release(pin);
                {
                    let mut c = core.lock().unwrap_or_else(|e| e.into_inner());
                    c.enabled = false;
                }
                return Err(
                    MotionError::Resource(format!("open encoder input on pin {pin}: {e}")).into(),
                );
            }
        };

        slots.insert(
            sensor_id,
            Slot {
                pin,
                core,
                input: Some(input),
            },
        );
        drop(slots);

        tracing::info!(sensor_id, pin, "encoder enabled");
        self.bus.publish(Event::SensorState(SensorStateEvent {
            sensor_id,
            enabled: true,
        }));
        Ok(())
    }

    /// Stop edge delivery and release the input pin. Historical counts are
    /// preserved; `reset` clears them independently.
    pub fn disable(&self, sensor_id: u8) -> Result<()> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = slots.get_mut(&sensor_id) else {
            return Err(MotionError::Precondition(format!("unknown sensor {sensor_id}")).into());
        };
        if slot.input.is_none() {
            return Ok(());
        }
        Self::detach(&self.claims, slot);
        drop(slots);

        tracing::info!(sensor_id, "encoder disabled");
        self.bus.publish(Event::SensorState(SensorStateEvent {
            sensor_id,
            enabled: false,
        }));
        Ok(())
    }

    /// Zero the pulse count, empty the window, and drop the RPM estimate.
    pub fn reset(&self, sensor_id: u8) -> Result<()> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = slots.get(&sensor_id) else {
            return Err(MotionError::Precondition(format!("unknown sensor {sensor_id}")).into());
        };
        let mut core = slot.core.lock().unwrap_or_else(|e| e.into_inner());
        core.reset();
        tracing::debug!(sensor_id, "encoder counters reset");
        Ok(())
    }

    pub fn read(&self, sensor_id: u8) -> Result<SensorSnapshot> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = slots.get(&sensor_id) else {
            return Err(MotionError::Precondition(format!("unknown sensor {sensor_id}")).into());
        };
        let core = slot.core.lock().unwrap_or_else(|e| e.into_inner());
        Ok(core.snapshot())
    }

    /// Snapshot of every known sensor, ordered by id.
    pub fn status(&self) -> Vec<SensorSnapshot> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<SensorSnapshot> = slots
            .values()
            .map(|slot| {
                let core = slot.core.lock().unwrap_or_else(|e| e.into_inner());
                core.snapshot()
            })
            .collect();
        out.sort_unstable_by_key(|s| s.sensor_id);
        out
    }

    /// Disable every enabled sensor (shutdown path); returns their ids.
    pub fn disable_all(&self) -> Vec<u8> {
        let ids: Vec<u8> = {
            let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots
                .iter()
                .filter(|(_, s)| s.input.is_some())
                .map(|(&id, _)| id)
                .collect()
        };
        let mut disabled = Vec::with_capacity(ids.len());
        for id in ids {
            if self.disable(id).is_ok() {
                disabled.push(id);
            }
        }
        disabled.sort_unstable();
        disabled
    }

    fn detach(claims: &PinClaims, slot: &mut Slot) {
        {
            let mut core = slot.core.lock().unwrap_or_else(|e| e.into_inner());
            core.enabled = false;
        }
        if let Some(input) = slot.input.take() {
            let pin = input.pin();
            drop(input);
            claims.release(pin);
        }
    }
}

impl Tachometer for EncoderBank {
    fn enabled(&self, sensor_id: u8) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .get(&sensor_id)
            .map(|s| s.input.is_some())
            .unwrap_or(false)
    }

    fn filtered_rpm(&self, sensor_id: u8) -> Option<f64> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(&sensor_id).map(|slot| {
            let core = slot.core.lock().unwrap_or_else(|e| e.into_inner());
            core.filtered_rpm.unwrap_or(0.0)
        })
    }

    fn reset_filter(&self, sensor_id: u8) {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get(&sensor_id) {
            let mut core = slot.core.lock().unwrap_or_else(|e| e.into_inner());
            core.reset_filter();
        }
    }
}
