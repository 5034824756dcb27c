//! Small shared helpers for axle_core.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::MotionError;

/// Highest valid BCM pin number on the target board.
pub const PIN_MAX: u8 = 27;

/// Wall-clock milliseconds since the unix epoch, for telemetry stamps only.
/// Control math never uses this; it runs on the monotonic clock.
pub fn wall_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().min(u128::from(u64::MAX)) as u64)
        .unwrap_or(0)
}

/// Reject pins outside the board's header range before any backend call.
pub fn validate_pin(pin: u8) -> std::result::Result<(), MotionError> {
    if pin > PIN_MAX {
        return Err(MotionError::Validation(format!(
            "pin {pin} out of range (0-{PIN_MAX})"
        )));
    }
    Ok(())
}
