//! Host context bound to a running script.
//!
//! The script polls [`ScriptContext::is_running`] as its loop condition,
//! sleeps through the context so forced stop can interrupt waits, sends
//! user-visible messages, reads X-sensor values, and tunes its own per-run
//! configuration. All of it runs on the script's blocking thread, so every
//! method here is synchronous.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use brickd_core::{OutboundEnvelope, SessionId, protocol};

use crate::events::EventSink;
use crate::hardware::HardwareProvider;
use crate::xsensor::XSensorRegistry;

/// Largest chunk a host-side wait will sleep before re-checking the kill
/// signal. Bounds how long a sleeping script can outlive a forced stop.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Per-run configuration, tuned by the script itself. All setters clamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScriptConfig {
    /// Wait inserted into each `is_running` poll, `[0, 1000]`ms.
    pub is_running_wait: Duration,
    /// Whether the brick's escape key also triggers cooperative stop.
    pub check_escape_key: bool,
    /// Grace period before a stop is escalated to forced termination,
    /// `[1000, 60000]`ms.
    pub grace_timeout: Duration,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            is_running_wait: Duration::ZERO,
            check_escape_key: true,
            grace_timeout: Duration::from_secs(5),
        }
    }
}

/// Shared state between one script run and the lifecycle manager.
pub struct ScriptContext {
    /// Cooperative flag: true while the script should keep going.
    running: AtomicBool,
    /// Forced-termination signal, observed by the interpreter at a bounded
    /// instruction interval and by sliced host sleeps.
    kill: CancellationToken,
    config: Mutex<ScriptConfig>,
    sink: Arc<dyn EventSink>,
    origin: SessionId,
    xsensors: Arc<XSensorRegistry>,
    hardware: Arc<dyn HardwareProvider>,
}

impl ScriptContext {
    pub fn new(
        origin: SessionId,
        sink: Arc<dyn EventSink>,
        xsensors: Arc<XSensorRegistry>,
        hardware: Arc<dyn HardwareProvider>,
    ) -> Self {
        Self {
            running: AtomicBool::new(true),
            kill: CancellationToken::new(),
            config: Mutex::new(ScriptConfig::default()),
            sink,
            origin,
            xsensors,
            hardware,
        }
    }

    /// The session that submitted this run.
    pub fn origin(&self) -> SessionId {
        self.origin
    }

    /// Ask the script to stop at its next `is_running` poll.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Escalate to forced termination.
    pub fn kill(&self) {
        self.request_stop();
        self.kill.cancel();
    }

    pub fn killed(&self) -> bool {
        self.kill.is_cancelled()
    }

    fn stop_requested(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }

    /// Poll primitive for script loops: `while ctx.is_running() { ... }`.
    ///
    /// Applies the configured poll wait (so tight loops stay thread-friendly
    /// on constrained hardware) and folds the physical escape key into the
    /// cooperative stop signal when enabled.
    pub fn is_running(&self) -> bool {
        if self.stop_requested() {
            return false;
        }
        let (wait, check_escape) = {
            let config = self.config.lock();
            (config.is_running_wait, config.check_escape_key)
        };
        if wait.is_zero() {
            std::thread::yield_now();
        } else {
            self.sleep(wait);
        }
        if check_escape && self.hardware.escape_pressed() {
            self.request_stop();
        }
        !self.stop_requested()
    }

    /// Sleep for the given duration, returning early on forced stop.
    pub fn sleep(&self, duration: Duration) {
        let mut remaining = duration;
        while !remaining.is_zero() && !self.killed() {
            let slice = remaining.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
    }

    /// Sleep expressed in (possibly fractional) seconds, as scripts call it.
    pub fn sleep_secs(&self, seconds: f64) {
        if seconds > 0.0 {
            self.sleep(Duration::from_secs_f64(seconds));
        }
    }

    /// Send free text to every connected client as an `InfoUser` frame.
    pub fn message(&self, text: &str) {
        self.sink
            .emit(OutboundEnvelope::broadcast(protocol::info_user_frame(text)));
    }

    /// Current decoded value of the named X-sensor, as flat JSON.
    pub fn xsensor_json(&self, name: &str) -> Value {
        self.xsensors.value(name).to_json()
    }

    pub fn config(&self) -> ScriptConfig {
        *self.config.lock()
    }

    pub fn set_is_running_wait_ms(&self, ms: i64) {
        self.config.lock().is_running_wait = Duration::from_millis(ms.clamp(0, 1000) as u64);
    }

    pub fn set_check_escape_key(&self, check: bool) {
        self.config.lock().check_escape_key = check;
    }

    pub fn set_grace_timeout_ms(&self, ms: i64) {
        self.config.lock().grace_timeout = Duration::from_millis(ms.clamp(1000, 60_000) as u64);
    }

    /// Grace period to use when this run has to be stopped.
    pub fn grace_timeout(&self) -> Duration {
        self.config.lock().grace_timeout
    }
}
