#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Closed-loop wheel-speed control core (hardware-agnostic).
//!
//! All hardware interactions go through the `axle_traits::GpioBackend`
//! contract, so the same core runs against the Raspberry Pi driver and the
//! simulation backend.
//!
//! ## Architecture
//!
//! - **PWM registry**: validated, idempotent duty-cycle actuation per pin
//!   (`pwm` module)
//! - **Encoder pipeline**: debounced pulse capture, rolling-window rate,
//!   EMA-filtered RPM (`encoder` module)
//! - **RPM controller**: gain-scheduled PID with feed-forward break-away
//!   kick and saturation anti-windup (`controller` module)
//! - **Event bus**: non-blocking telemetry fan-out with per-subscriber
//!   drop-oldest queues (`bus` module)
//! - **System**: one object owning the above plus the pin-claim table
//!   (`system` module)

pub mod bus;
pub mod claims;
pub mod config;
pub mod controller;
pub mod encoder;
pub mod error;
pub mod mocks;
pub mod pwm;
pub mod status;
pub mod system;
pub mod ticker;
pub mod util;

pub use bus::{Event, EventBus, EventStream, PulseObserved, PulseSource, PwmUpdated, SensorState};
pub use config::{ControllerCfg, EncoderCfg, GainSchedule, Gains};
pub use controller::{Actuator, RpmController, Tachometer};
pub use encoder::EncoderBank;
pub use error::{BuildError, MotionError, Result};
pub use pwm::{ControlOutput, PwmRegistry};
pub use status::{ControllerSnapshot, PwmStatus, SensorSnapshot};
pub use system::{MotionSystem, SystemCfg};
pub use util::PIN_MAX;
