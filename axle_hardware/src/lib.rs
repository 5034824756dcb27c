//! axle_hardware: GPIO backends behind the `axle_traits` contracts.
//!
//! Features:
//! - `hardware`: enable the rppal-backed Raspberry Pi implementation.
//! - (always) `sim`: a simulation backend that records duty writes and lets
//!   callers inject encoder edges. Unlike a compile-time switch, the sim
//!   stays available in hardware builds because backend selection happens
//!   at runtime: [`detect_backend`] probes the native driver once and falls
//!   back to simulation when the probe fails.
//!
//! Note: The `rppal` dependency is optional and only enabled when the
//!       `hardware` feature is active. This lets CI on x86 build without
//!       pulling GPIO libs.

pub mod error;
pub mod plant;
pub mod sim;

#[cfg(feature = "hardware")]
pub mod hardware;

use std::sync::Arc;

use axle_traits::GpioBackend;

/// Probe the native GPIO driver and return the backend to use.
///
/// On a board without the driver (or without permissions) this logs one
/// warning and returns the simulation backend; callers report the mode
/// through their status surfaces rather than failing startup.
pub fn detect_backend() -> Arc<dyn GpioBackend> {
    #[cfg(feature = "hardware")]
    {
        match hardware::PiBackend::try_new() {
            Ok(b) => {
                tracing::info!("native GPIO driver ready");
                return Arc::new(b);
            }
            Err(e) => {
                tracing::warn!(error = %e, "native GPIO unavailable; continuing in simulation");
            }
        }
    }
    Arc::new(sim::SimBackend::new())
}

pub use error::HwError;
pub use plant::{SpinPlant, SpinPlantCfg};
pub use sim::SimBackend;
