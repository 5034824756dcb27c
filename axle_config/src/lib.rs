use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Default wiring for the CLI commands; individual commands override these.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Pins {
    /// Control output driving the wheel motor.
    pub control: u8,
    /// Encoder input for the bound sensor.
    pub sensor: u8,
    /// Sensor id the encoder registers under.
    pub sensor_id: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            control: 18,
            sensor: 21,
            sensor_id: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Controller {
    pub update_rate_ms: u64,
    pub deadband_rpm: f64,
    pub low_speed_threshold_rpm: f64,
    pub low_kp: f64,
    pub low_ki: f64,
    pub low_kd: f64,
    pub high_kp: f64,
    pub high_ki: f64,
    pub high_kd: f64,
    /// Break-away offset; depends on the physical motor, so it is a
    /// startup knob rather than a constant.
    pub base_kick: u8,
    pub kick_per_target_rpm: f64,
    pub integral_limit: f64,
    pub pwm_frequency_hz: u32,
}

impl Default for Controller {
    fn default() -> Self {
        Self {
            update_rate_ms: 100,
            deadband_rpm: 1.0,
            low_speed_threshold_rpm: 20.0,
            low_kp: 0.35,
            low_ki: 0.05,
            low_kd: 0.0,
            high_kp: 2.5,
            high_ki: 0.35,
            high_kd: 0.04,
            base_kick: 4,
            kick_per_target_rpm: 0.15,
            integral_limit: 100.0,
            pwm_frequency_hz: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Encoder {
    pub pulses_per_rotation: f64,
    pub debounce_us: u64,
    pub window_us: u64,
    pub min_window_us: u64,
    pub filter_alpha: f64,
}

impl Default for Encoder {
    fn default() -> Self {
        Self {
            pulses_per_rotation: 45.0,
            debounce_us: 5_000,
            window_us: 1_000_000,
            min_window_us: 25_000,
            filter_alpha: 0.4,
        }
    }
}

/// Simulated drivetrain parameters, used when the native GPIO driver is
/// absent and a plant model stands in for the motor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Plant {
    pub rpm_per_duty: f64,
    pub tau_s: f64,
    pub breakaway_duty: u8,
}

impl Default for Plant {
    fn default() -> Self {
        Self {
            rpm_per_duty: 0.8,
            tau_s: 0.25,
            breakaway_duty: 6,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub pins: Pins,
    pub controller: Controller,
    pub encoder: Encoder,
    pub plant: Plant,
    pub logging: Logging,
}

impl Config {
    /// Range checks mirroring the core's validation, so a bad file fails
    /// at startup with a readable message instead of at first use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pins.control > 27 || self.pins.sensor > 27 {
            return Err(ConfigError::Invalid("pins must be 0-27"));
        }
        if self.pins.control == self.pins.sensor {
            return Err(ConfigError::Invalid("control and sensor pins must differ"));
        }
        let c = &self.controller;
        if c.update_rate_ms == 0 {
            return Err(ConfigError::Invalid("controller.update_rate_ms must be >= 1"));
        }
        if !c.deadband_rpm.is_finite() || c.deadband_rpm < 0.0 {
            return Err(ConfigError::Invalid("controller.deadband_rpm must be >= 0"));
        }
        if !c.integral_limit.is_finite() || c.integral_limit <= 0.0 {
            return Err(ConfigError::Invalid("controller.integral_limit must be > 0"));
        }
        if c.pwm_frequency_hz < 1 || c.pwm_frequency_hz > 8000 {
            return Err(ConfigError::Invalid("controller.pwm_frequency_hz must be 1-8000"));
        }
        for g in [c.low_kp, c.low_ki, c.low_kd, c.high_kp, c.high_ki, c.high_kd] {
            if !g.is_finite() || g < 0.0 {
                return Err(ConfigError::Invalid("controller gains must be finite and >= 0"));
            }
        }
        let e = &self.encoder;
        if !e.pulses_per_rotation.is_finite() || e.pulses_per_rotation <= 0.0 {
            return Err(ConfigError::Invalid("encoder.pulses_per_rotation must be > 0"));
        }
        if !(e.filter_alpha > 0.0 && e.filter_alpha <= 1.0) {
            return Err(ConfigError::Invalid("encoder.filter_alpha must be in (0, 1]"));
        }
        if e.min_window_us > e.window_us {
            return Err(ConfigError::Invalid(
                "encoder.min_window_us must not exceed encoder.window_us",
            ));
        }
        let p = &self.plant;
        if !p.rpm_per_duty.is_finite() || p.rpm_per_duty <= 0.0 {
            return Err(ConfigError::Invalid("plant.rpm_per_duty must be > 0"));
        }
        if !p.tau_s.is_finite() || p.tau_s <= 0.0 {
            return Err(ConfigError::Invalid("plant.tau_s must be > 0"));
        }
        Ok(())
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}
