//! Snapshot types returned by the status queries and carried on the bus.

use serde::Serialize;

/// One active PWM output entry.
#[derive(Debug, Clone, Serialize)]
pub struct PwmStatus {
    pub pin: u8,
    pub duty: u8,
    pub frequency_hz: u32,
    pub enabled: bool,
}

/// Point-in-time view of one encoder sensor.
#[derive(Debug, Clone, Serialize)]
pub struct SensorSnapshot {
    pub sensor_id: u8,
    pub pin: u8,
    pub enabled: bool,
    pub pulse_count: u64,
    pub rate_pps: f64,
    pub filtered_rpm: f64,
    pub last_pulse_wall_ms: Option<u64>,
}

/// Point-in-time view of the controller; also the `ControllerStatus`
/// telemetry payload.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerSnapshot {
    pub active: bool,
    pub target_rpm: f64,
    pub current_rpm: f64,
    pub current_pwm: u8,
    pub error: f64,
    pub control_pin: u8,
    pub sensor_id: u8,
    pub wall_ms: u64,
}
