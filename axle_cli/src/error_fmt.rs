//! Human-readable error rendering for the CLI boundary.

use axle_core::{BuildError, MotionError};

/// Map a command failure to a what/likely-causes/how-to-fix message.
/// Typed downcasts first, string heuristics as the fallback.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(me) = err.downcast_ref::<MotionError>() {
        return match me {
            MotionError::Validation(msg) => format!(
                "What happened: A command argument was out of range ({msg}).\nLikely causes: Typo in --pin/--duty/--frequency/--target-rpm.\nHow to fix: Pins are 0-27, duty 0-255, frequency 1-8000 Hz, target RPM > 0."
            ),
            MotionError::Resource(msg) => format!(
                "What happened: The GPIO backend refused an operation ({msg}).\nLikely causes: Missing driver permissions, or the pin is held by another process.\nHow to fix: Check GPIO access rights; on a desktop the server runs in simulation, so pass pins that are free in this process."
            ),
            MotionError::Precondition(msg) => format!(
                "What happened: The command hit state that does not exist ({msg}).\nLikely causes: The sensor was never enabled, or the pin has no active PWM entry.\nHow to fix: Enable the sensor (or set the pin) first, then retry."
            ),
            MotionError::Conflict(msg) => format!(
                "What happened: Pin ownership conflict ({msg}).\nLikely causes: The same pin was requested as both a PWM output and an encoder input.\nHow to fix: Pick distinct pins for --control-pin and --sensor-pin."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return format!(
            "What happened: The controller could not be assembled ({be}).\nLikely causes: Invalid [controller] values in the config TOML.\nHow to fix: Edit the config file and rerun; `axle self-check` validates it."
        );
    }

    if let Some(ce) = err.downcast_ref::<axle_config::ConfigError>() {
        return format!(
            "What happened: {ce}.\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See README for a sample."
        );
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();
    if lower.contains("parse config") || lower.contains("expected") {
        return format!(
            "What happened: The config file did not parse.\nHow to fix: Fix the TOML syntax and retry. Original: {msg}"
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}
