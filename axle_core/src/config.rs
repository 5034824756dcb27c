//! Configuration structs for the core. Defaults are the calibrated values
//! for the reference drivetrain; everything here is startup-immutable.

use crate::error::BuildError;

/// One set of PID coefficients.
#[derive(Debug, Clone, Copy)]
pub struct Gains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

/// Two-zone gain schedule keyed on the target RPM. The plant is strongly
/// non-linear near stall, so low targets get soft gains and high targets
/// get aggressive ones.
#[derive(Debug, Clone)]
pub struct GainSchedule {
    pub low: Gains,
    pub high: Gains,
    /// Targets below this use the low-speed gains.
    pub low_speed_threshold_rpm: f64,
}

impl Default for GainSchedule {
    fn default() -> Self {
        Self {
            low: Gains {
                kp: 0.35,
                ki: 0.05,
                kd: 0.0,
            },
            high: Gains {
                kp: 2.5,
                ki: 0.35,
                kd: 0.04,
            },
            low_speed_threshold_rpm: 20.0,
        }
    }
}

impl GainSchedule {
    /// Select the gain zone for a target RPM.
    pub fn for_target(&self, target_rpm: f64) -> Gains {
        if target_rpm < self.low_speed_threshold_rpm {
            self.low
        } else {
            self.high
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerCfg {
    /// Control tick period in milliseconds.
    pub update_rate_ms: u64,
    /// Errors smaller than this hold the last actuation.
    pub deadband_rpm: f64,
    pub gains: GainSchedule,
    /// Feed-forward break-away offset. Motor-specific; startup-tunable.
    pub base_kick: u8,
    /// Slope of the feed-forward kick over the target RPM.
    pub kick_per_target_rpm: f64,
    /// Integral term clamp, symmetric around zero.
    pub integral_limit: f64,
    /// Seconds spent at an actuator limit before the integral bleeds.
    pub sat_bleed_after_s: f64,
    /// Multiplier applied to the integral per saturated tick past the limit.
    pub sat_bleed_factor: f64,
    /// Carrier frequency used for the control output pin.
    pub pwm_frequency_hz: u32,
}

impl Default for ControllerCfg {
    fn default() -> Self {
        Self {
            update_rate_ms: 100,
            deadband_rpm: 1.0,
            gains: GainSchedule::default(),
            base_kick: 4,
            kick_per_target_rpm: 0.15,
            integral_limit: 100.0,
            sat_bleed_after_s: 0.25,
            sat_bleed_factor: 0.7,
            pwm_frequency_hz: 1000,
        }
    }
}

impl ControllerCfg {
    pub fn validate(&self) -> std::result::Result<(), BuildError> {
        if self.update_rate_ms == 0 {
            return Err(BuildError::InvalidConfig("update_rate_ms must be >= 1"));
        }
        if !self.deadband_rpm.is_finite() || self.deadband_rpm < 0.0 {
            return Err(BuildError::InvalidConfig("deadband_rpm must be >= 0"));
        }
        if !self.integral_limit.is_finite() || self.integral_limit <= 0.0 {
            return Err(BuildError::InvalidConfig("integral_limit must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.sat_bleed_factor) || self.sat_bleed_factor == 0.0 {
            return Err(BuildError::InvalidConfig("sat_bleed_factor must be in (0, 1]"));
        }
        if !self.kick_per_target_rpm.is_finite() || self.kick_per_target_rpm < 0.0 {
            return Err(BuildError::InvalidConfig("kick_per_target_rpm must be >= 0"));
        }
        if self.pwm_frequency_hz < 1 || self.pwm_frequency_hz > 8000 {
            return Err(BuildError::InvalidConfig("pwm_frequency_hz must be 1-8000"));
        }
        Ok(())
    }

    /// The feed-forward floor for a target: enough duty to break static
    /// friction while accelerating toward it.
    pub fn kick_floor(&self, target_rpm: f64) -> f64 {
        (f64::from(self.base_kick) + self.kick_per_target_rpm * target_rpm).clamp(0.0, 255.0)
    }
}

#[derive(Debug, Clone)]
pub struct EncoderCfg {
    /// Encoder pulses per shaft rotation (calibration).
    pub pulses_per_rotation: f64,
    /// Edges closer than this to the last accepted edge are bounce.
    pub debounce_us: u64,
    /// Rolling rate window length.
    pub window_us: u64,
    /// The window must span at least this long before a rate is trusted.
    pub min_window_us: u64,
    /// EMA coefficient for the filtered RPM.
    pub filter_alpha: f64,
}

impl Default for EncoderCfg {
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

impl EncoderCfg {
    pub fn validate(&self) -> std::result::Result<(), BuildError> {
        if !self.pulses_per_rotation.is_finite() || self.pulses_per_rotation <= 0.0 {
            return Err(BuildError::InvalidConfig("pulses_per_rotation must be > 0"));
        }
        if !(self.filter_alpha > 0.0 && self.filter_alpha <= 1.0) {
            return Err(BuildError::InvalidConfig("filter_alpha must be in (0, 1]"));
        }
        if self.min_window_us > self.window_us {
            return Err(BuildError::InvalidConfig("min_window_us must not exceed window_us"));
        }
        Ok(())
    }
}
