//! Top-level system object.
//!
//! Owns the backend, the event bus, the PWM registry, the encoder bank, and
//! the controller as explicit instances, and exposes the command surface as
//! plain methods. External transports receive a reference to this object,
//! not module globals.

use std::sync::Arc;

use axle_traits::GpioBackend;

use crate::bus::{EventBus, EventStream};
use crate::claims::PinClaims;
use crate::config::{ControllerCfg, EncoderCfg};
use crate::controller::RpmController;
use crate::encoder::EncoderBank;
use crate::error::Result;
use crate::pwm::{ControlOutput, PwmRegistry};
use crate::status::{ControllerSnapshot, PwmStatus, SensorSnapshot};

#[derive(Debug, Clone, Default)]
pub struct SystemCfg {
    pub controller: ControllerCfg,
    pub encoder: EncoderCfg,
}

pub struct MotionSystem {
    backend: Arc<dyn GpioBackend>,
    bus: Arc<EventBus>,
    pwm: Arc<PwmRegistry>,
    sensors: Arc<EncoderBank>,
    controller: RpmController,
    control_frequency_hz: u32,
}

impl MotionSystem {
    pub fn new(backend: Arc<dyn GpioBackend>, cfg: SystemCfg) -> Result<Self> {
        cfg.encoder.validate()?;
        let bus = Arc::new(EventBus::new());
        let claims = Arc::new(PinClaims::default());
        let pwm = Arc::new(PwmRegistry::new(backend.clone(), bus.clone(), claims.clone()));
        let sensors = Arc::new(EncoderBank::new(
            backend.clone(),
            bus.clone(),
            claims,
            cfg.encoder,
        ));
        let control_frequency_hz = cfg.controller.pwm_frequency_hz;
        let actuator = Arc::new(ControlOutput::new(pwm.clone(), control_frequency_hz));
        let controller = RpmController::builder()
            .with_tachometer(sensors.clone())
            .with_actuator(actuator)
            .with_bus(bus.clone())
            .with_cfg(cfg.controller)
            .build()?;
        if backend.simulated() {
            tracing::info!("motion system running against the simulation backend");
        }
        Ok(Self {
            backend,
            bus,
            pwm,
            sensors,
            controller,
            control_frequency_hz,
        })
    }

    /// True when the GPIO backend is the simulation fallback.
    pub fn simulated(&self) -> bool {
        self.backend.simulated()
    }

    /// Subscribe to the telemetry stream.
    pub fn subscribe(&self) -> EventStream {
        self.bus.subscribe()
    }

    // ── pwm.* ────────────────────────────────────────────────────────────

    pub fn pwm_set(&self, pin: u8, duty: u16, frequency_hz: u32, enabled: bool) -> Result<()> {
        self.pwm.set(pin, duty, frequency_hz, enabled)
    }

    pub fn pwm_stop(&self, pin: u8) -> Result<()> {
        self.pwm.stop(pin)
    }

    pub fn pwm_stop_all(&self) -> Vec<u8> {
        self.pwm.stop_all()
    }

    pub fn pwm_status(&self) -> Vec<PwmStatus> {
        self.pwm.status()
    }

    // ── sensor.* ─────────────────────────────────────────────────────────

    pub fn sensor_enable(&self, sensor_id: u8, pin: u8) -> Result<()> {
        self.sensors.enable(sensor_id, pin)
    }

    pub fn sensor_disable(&self, sensor_id: u8) -> Result<()> {
        self.sensors.disable(sensor_id)
    }

    pub fn sensor_reset(&self, sensor_id: u8) -> Result<()> {
        self.sensors.reset(sensor_id)
    }

    pub fn sensor_read(&self, sensor_id: u8) -> Result<SensorSnapshot> {
        self.sensors.read(sensor_id)
    }

    pub fn sensor_status(&self) -> Vec<SensorSnapshot> {
        self.sensors.status()
    }

    // ── rpm.* ────────────────────────────────────────────────────────────

    pub fn rpm_start(&self, target_rpm: f64, control_pin: u8, sensor_id: u8) -> Result<()> {
        // Secure the control pin as an output up front so a role conflict
        // surfaces here instead of inside the periodic tick.
        let existed = self.pwm.status().iter().any(|s| s.pin == control_pin);
        self.pwm.set(control_pin, 0, self.control_frequency_hz, true)?;
        match self.controller.start(target_rpm, control_pin, sensor_id) {
            Ok(()) => Ok(()),
            Err(e) => {
                if !existed {
                    let _ = self.pwm.stop(control_pin);
                }
                Err(e)
            }
        }
    }

    pub fn rpm_stop(&self) -> Result<()> {
        self.controller.stop()
    }

    pub fn rpm_set_target(&self, target_rpm: f64) -> Result<()> {
        self.controller.set_target(target_rpm)
    }

    pub fn rpm_set_params(&self, control_pin: Option<u8>, sensor_id: Option<u8>) -> Result<()> {
        self.controller.set_params(control_pin, sensor_id)
    }

    pub fn rpm_status(&self) -> ControllerSnapshot {
        self.controller.status()
    }

    /// Ordered teardown: halt the loop, drive every output low, then close
    /// the inputs. Safe to call more than once.
    pub fn shutdown(&self) {
        if let Err(e) = self.controller.stop() {
            tracing::warn!(error = %e, "controller stop failed during shutdown");
        }
        let stopped = self.pwm.stop_all();
        let disabled = self.sensors.disable_all();
        tracing::info!(?stopped, ?disabled, "motion system shut down");
    }
}

impl Drop for MotionSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}
