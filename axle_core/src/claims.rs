//! Process-wide pin ownership table.
//!
//! A pin is unused, a PWM output, or an encoder input, never two at once.
//! The registry and the encoder bank both claim through this table before
//! touching the backend, so conflicts are rejected without side effects.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Mutex;

use crate::error::MotionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinRole {
    PwmOutput,
    EncoderInput,
}

impl PinRole {
    fn describe(self) -> &'static str {
        match self {
            PinRole::PwmOutput => "a pwm output",
            PinRole::EncoderInput => "an encoder input",
        }
    }
}

#[derive(Default)]
pub struct PinClaims {
    held: Mutex<HashMap<u8, PinRole>>,
}

impl PinClaims {
    pub fn claim(&self, pin: u8, role: PinRole) -> Result<(), MotionError> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        match held.entry(pin) {
            Entry::Occupied(o) => Err(MotionError::Conflict(format!(
                "pin {pin} is already in use as {}",
                o.get().describe()
            ))),
            Entry::Vacant(v) => {
                v.insert(role);
                Ok(())
            }
        }
    }

    pub fn release(&self, pin: u8) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&pin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_roles_are_rejected_until_release() {
        let claims = PinClaims::default();
        claims.claim(18, PinRole::PwmOutput).unwrap();

        let err = claims.claim(18, PinRole::EncoderInput).unwrap_err();
        assert!(matches!(err, MotionError::Conflict(_)));

        claims.release(18);
        claims.claim(18, PinRole::EncoderInput).unwrap();
    }
}
