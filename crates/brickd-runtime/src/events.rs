//! Outbound event seam.

use brickd_core::OutboundEnvelope;

/// Destination for frames produced by scripts and the lifecycle manager.
///
/// The server crate implements this on its outgoing queue; tests implement
/// it with a recording vector. `emit` must be cheap and non-blocking — it is
/// called from the script's blocking thread.
pub trait EventSink: Send + Sync {
    fn emit(&self, envelope: OutboundEnvelope);
}
