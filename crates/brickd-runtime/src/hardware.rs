//! Hardware resource seam.
//!
//! The daemon itself never talks to motors or sensors; the currently running
//! script context is the only owner of hardware handles, and the lifecycle
//! manager is the only caller of [`HardwareProvider::release_all`]. Release
//! failures are logged by the caller, never propagated.

use tracing::warn;

/// Errors from the hardware layer.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HardwareError {
    #[error("failed to acquire port {port}: {detail}")]
    Acquire { port: String, detail: String },
    #[error("failed to release hardware handles: {0}")]
    Release(String),
}

/// Provider of exclusive hardware handles for the running script.
pub trait HardwareProvider: Send + Sync {
    /// Acquire the device on the given port for the current run.
    fn acquire(&self, port: &str) -> Result<(), HardwareError>;

    /// Release every handle held by the current run. Must be idempotent;
    /// called on every script exit path including forced termination.
    fn release_all(&self) -> Result<(), HardwareError>;

    /// Whether the designated physical stop signal (the brick's escape key)
    /// is currently pressed.
    fn escape_pressed(&self) -> bool {
        false
    }
}

/// No-op provider for running off-brick (development, tests).
#[derive(Clone, Copy, Debug, Default)]
pub struct NullHardware;

impl HardwareProvider for NullHardware {
    fn acquire(&self, _port: &str) -> Result<(), HardwareError> {
        Ok(())
    }

    fn release_all(&self) -> Result<(), HardwareError> {
        Ok(())
    }
}

/// Release helper that downgrades failures to a warning.
pub(crate) fn release_quietly(hardware: &dyn HardwareProvider) {
    if let Err(e) = hardware.release_all() {
        warn!(error = %e, "hardware release failed, continuing");
    }
}
