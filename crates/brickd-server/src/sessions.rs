//! Registry of connected WebSocket sessions.
//!
//! Each connection registers an outbound channel under a fresh [`SessionId`]
//! and unregisters it on close. Delivery is fire-and-forget: a frame for a
//! session that vanished is dropped silently, a full channel drops the frame
//! for that session only, and a closed channel unregisters the session on
//! the spot. One slow or dead client never blocks the others.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use brickd_core::{OutboundEnvelope, SessionId};

/// Connected-client count past which we log a warning. The device this runs
/// on is small; a handful of browsers is the expected load.
pub const SESSION_SOFT_LIMIT: usize = 5;

/// Per-session outbound channel capacity.
pub const SESSION_CHANNEL_CAPACITY: usize = 64;

/// All currently connected sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, mpsc::Sender<String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session and return its id.
    pub fn connect(&self, tx: mpsc::Sender<String>) -> SessionId {
        let id = SessionId::new();
        let mut sessions = self.sessions.lock();
        let _ = sessions.insert(id, tx);
        let count = sessions.len();
        drop(sessions);
        info!(session = %id, count, "session connected");
        if count > SESSION_SOFT_LIMIT {
            warn!(count, "more sessions than expected for this device");
        }
        id
    }

    /// Unregister a session. Idempotent.
    pub fn disconnect(&self, id: SessionId) {
        if self.sessions.lock().remove(&id).is_some() {
            info!(session = %id, "session disconnected");
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Deliver one envelope: to its target session, or to every session
    /// when it is a broadcast.
    pub fn send(&self, envelope: &OutboundEnvelope) {
        match envelope.target {
            Some(target) => {
                let tx = self.sessions.lock().get(&target).cloned();
                match tx {
                    Some(tx) => self.send_one(target, &tx, &envelope.payload),
                    // The session closed between enqueue and delivery.
                    None => debug!(session = %target, "dropping frame for vanished session"),
                }
            }
            None => {
                let targets: Vec<_> = self
                    .sessions
                    .lock()
                    .iter()
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect();
                for (id, tx) in targets {
                    self.send_one(id, &tx, &envelope.payload);
                }
            }
        }
    }

    fn send_one(&self, id: SessionId, tx: &mpsc::Sender<String>, payload: &str) {
        match tx.try_send(payload.to_string()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(session = %id, "outbound channel full, dropping frame");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.disconnect(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(registry: &SessionRegistry) -> (SessionId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        (registry.connect(tx), rx)
    }

    #[test]
    fn unicast_reaches_only_the_target() {
        let registry = SessionRegistry::new();
        let (a, mut rx_a) = connect(&registry);
        let (_b, mut rx_b) = connect(&registry);

        registry.send(&OutboundEnvelope::unicast(a, "only-a".into()));
        assert_eq!(rx_a.try_recv().unwrap(), "only-a");
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn broadcast_reaches_everyone() {
        let registry = SessionRegistry::new();
        let (_a, mut rx_a) = connect(&registry);
        let (_b, mut rx_b) = connect(&registry);

        registry.send(&OutboundEnvelope::broadcast("all".into()));
        assert_eq!(rx_a.try_recv().unwrap(), "all");
        assert_eq!(rx_b.try_recv().unwrap(), "all");
    }

    #[test]
    fn frame_for_vanished_session_is_dropped_silently() {
        let registry = SessionRegistry::new();
        let (a, rx_a) = connect(&registry);
        drop(rx_a);
        registry.disconnect(a);
        registry.send(&OutboundEnvelope::unicast(a, "gone".into()));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn closed_channel_unregisters_the_session() {
        let registry = SessionRegistry::new();
        let (a, rx_a) = connect(&registry);
        let (_b, mut rx_b) = connect(&registry);
        drop(rx_a);

        registry.send(&OutboundEnvelope::broadcast("still-delivered".into()));
        assert_eq!(rx_b.try_recv().unwrap(), "still-delivered");
        assert_eq!(registry.count(), 1);
        assert!(!registry.sessions.lock().contains_key(&a));
    }

    #[test]
    fn disconnect_is_idempotent() {
        let registry = SessionRegistry::new();
        let (a, _rx) = connect(&registry);
        registry.disconnect(a);
        registry.disconnect(a);
        assert_eq!(registry.count(), 0);
    }
}
