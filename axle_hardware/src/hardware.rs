//! Raspberry Pi backend over rppal.
//!
//! Outputs use rppal's software PWM (`set_pwm_frequency`); good to the 8 kHz
//! this stack allows. Inputs are pulled up and report rising edges through
//! an async interrupt; the tick stamp comes from a backend-local monotonic
//! epoch so debounce math never touches the wall clock.

use std::time::Instant;

use anyhow::{Context, Result};
use axle_traits::{EdgeCallback, EdgeInput, GpioBackend, HwDynError, Level, PwmOutput};
use rppal::gpio::{Gpio, InputPin, OutputPin, Trigger};

use crate::error::HwError;

pub struct PiBackend {
    gpio: Gpio,
    epoch: Instant,
}

impl PiBackend {
    /// Open the native GPIO driver. Fails on boards without it (or without
    /// permissions); callers fall back to simulation.
    pub fn try_new() -> Result<Self> {
        let gpio = Gpio::new().context("open native GPIO driver")?;
        Ok(Self {
            gpio,
            epoch: Instant::now(),
        })
    }
}

impl GpioBackend for PiBackend {
    fn open_output(&self, pin: u8) -> Result<Box<dyn PwmOutput>, HwDynError> {
        let out = self
            .gpio
            .get(pin)
            .map_err(|e| HwError::Gpio(format!("get output pin {pin}: {e}")))?
            .into_output_low();
        Ok(Box::new(PiPwm {
            pin: out,
            frequency_hz: 0,
            duty: 0,
        }))
    }

    fn open_input(&self, pin: u8, mut on_edge: EdgeCallback) -> Result<Box<dyn EdgeInput>, HwDynError> {
        let mut input = self
            .gpio
            .get(pin)
            .map_err(|e| HwError::Gpio(format!("get input pin {pin}: {e}")))?
            .into_input_pullup();
        let epoch = self.epoch;
        input
            .set_async_interrupt(Trigger::RisingEdge, move |level| {
                let tick_us = epoch.elapsed().as_micros().min(u128::from(u64::MAX)) as u64;
                let level = match level {
                    rppal::gpio::Level::High => Level::High,
                    rppal::gpio::Level::Low => Level::Low,
                };
                on_edge(level, tick_us);
            })
            .map_err(|e| HwError::Gpio(format!("arm edge interrupt on pin {pin}: {e}")))?;
        Ok(Box::new(PiInput { number: pin, _pin: input }))
    }

    fn simulated(&self) -> bool {
        false
    }
}

struct PiPwm {
    pin: OutputPin,
    frequency_hz: u32,
    duty: u8,
}

impl PiPwm {
    fn apply(&mut self) -> Result<(), HwDynError> {
        if self.duty == 0 || self.frequency_hz == 0 {
            self.pin
                .clear_pwm()
                .map_err(|e| HwError::Gpio(format!("clear pwm: {e}")))?;
            self.pin.set_low();
            return Ok(());
        }
        let duty_frac = f64::from(self.duty) / 255.0;
        self.pin
            .set_pwm_frequency(f64::from(self.frequency_hz), duty_frac)
            .map_err(|e| HwError::Gpio(format!("set pwm: {e}")))?;
        Ok(())
    }
}

impl std::fmt::Debug for PiPwm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiPwm").finish_non_exhaustive()
    }
}

impl PwmOutput for PiPwm {
    fn set_frequency(&mut self, hz: u32) -> Result<(), HwDynError> {
        self.frequency_hz = hz;
        self.apply()
    }

    fn write_duty(&mut self, duty: u8) -> Result<(), HwDynError> {
        self.duty = duty;
        self.apply()
    }
}

impl Drop for PiPwm {
    fn drop(&mut self) {
        // Release with the line low.
        let _ = self.pin.clear_pwm();
        self.pin.set_low();
    }
}

struct PiInput {
    number: u8,
    // Owning the rppal pin keeps the interrupt armed; dropping it clears it.
    _pin: InputPin,
}

impl std::fmt::Debug for PiInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiInput").field("number", &self.number).finish_non_exhaustive()
    }
}

impl EdgeInput for PiInput {
    fn pin(&self) -> u8 {
        self.number
    }
}
