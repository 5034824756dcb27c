use thiserror::Error;

/// Command-path error taxonomy. Every variant is surfaced to the caller;
/// runtime errors inside the control tick or an edge handler are logged
/// instead and never escape the task.
#[derive(Debug, Error, Clone)]
pub enum MotionError {
    /// Input out of range; no state was changed.
    #[error("invalid input: {0}")]
    Validation(String),
    /// GPIO backend open/write failure.
    #[error("gpio resource error: {0}")]
    Resource(String),
    /// Operation against state that does not exist or is not ready.
    #[error("precondition failed: {0}")]
    Precondition(String),
    /// A pin is already owned in a conflicting role.
    #[error("pin conflict: {0}")]
    Conflict(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing tachometer handle")]
    MissingTachometer,
    #[error("missing actuator handle")]
    MissingActuator,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
