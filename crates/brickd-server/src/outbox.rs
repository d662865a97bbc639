//! Outgoing notification queue.
//!
//! Everything the server says to clients goes through here: handlers and
//! the script runtime push envelopes, and a periodic delivery task drains
//! the queue in FIFO order into the session registry. Decoupling producers
//! from delivery keeps script threads and the dispatch worker from ever
//! touching a socket.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use brickd_core::OutboundEnvelope;
use brickd_runtime::EventSink;

use crate::sessions::SessionRegistry;

/// Drain period of the delivery task.
pub const DELIVERY_PERIOD: Duration = Duration::from_millis(50);
/// Delay before the first drain, letting startup settle.
pub const DELIVERY_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// FIFO queue of outbound envelopes awaiting delivery.
#[derive(Default)]
pub struct Outbox {
    queue: Mutex<VecDeque<OutboundEnvelope>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an envelope. Never blocks.
    pub fn push(&self, envelope: OutboundEnvelope) {
        self.queue.lock().push_back(envelope);
    }

    /// Take everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<OutboundEnvelope> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl EventSink for Outbox {
    fn emit(&self, envelope: OutboundEnvelope) {
        self.push(envelope);
    }
}

/// Spawn the periodic delivery task. Runs until the shutdown token fires.
pub fn spawn_delivery_task(
    outbox: Arc<Outbox>,
    sessions: Arc<SessionRegistry>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = shutdown.cancelled() => return,
            () = tokio::time::sleep(DELIVERY_INITIAL_DELAY) => {}
        }
        let mut tick = tokio::time::interval(DELIVERY_PERIOD);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    for envelope in outbox.drain() {
                        sessions.send(&envelope);
                    }
                }
            }
        }
        debug!("delivery task stopped");
    })
}
