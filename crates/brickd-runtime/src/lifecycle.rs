//! Script lifecycle manager.
//!
//! Owns at most one running script. `start` launches the script on a
//! dedicated blocking thread; `stop` is strictly two-phase — the cooperative
//! stop signal is always attempted first, forced termination is the
//! unconditional fallback after the grace period. Hardware handles are
//! released on every exit path: normal completion, script error, panic, and
//! forced termination.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Map;
use tracing::{error, info, warn};

use brickd_core::{BrickError, OutboundEnvelope, SessionId, protocol};

use crate::context::{ScriptConfig, ScriptContext};
use crate::events::EventSink;
use crate::hardware::{HardwareProvider, release_quietly};
use crate::interp::InterpreterRegistry;
use crate::xsensor::XSensorRegistry;

/// Interval between completion checks while stopping gracefully.
const STOP_POLL: Duration = Duration::from_millis(200);
/// How long to wait for the script thread to unwind after a forced abort.
/// The interpreter honors the kill signal within a bounded instruction
/// interval, so this is generous.
const FORCED_EXIT_WAIT: Duration = Duration::from_secs(2);
const FORCED_EXIT_POLL: Duration = Duration::from_millis(25);

/// Where the single script slot currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    StoppingGracefully,
}

/// The live run: its context plus a completion flag set by the script
/// thread on its way out.
struct ActiveRun {
    ctx: Arc<ScriptContext>,
    finished: Arc<AtomicBool>,
}

impl ActiveRun {
    fn finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Single-slot script executor.
pub struct ScriptManager {
    interpreters: InterpreterRegistry,
    xsensors: Arc<XSensorRegistry>,
    hardware: Arc<dyn HardwareProvider>,
    sink: Arc<dyn EventSink>,
    state: Arc<Mutex<RunState>>,
    /// Bumped on every `start`. A script thread that outlives the forced
    /// termination window must not clean up after a newer run, so the exit
    /// closure only releases and transitions state while its own generation
    /// is still the current one.
    generation: Arc<AtomicU64>,
    /// Serializes start/stop; the run itself executes outside this lock.
    active: tokio::sync::Mutex<Option<ActiveRun>>,
}

impl ScriptManager {
    pub fn new(
        interpreters: InterpreterRegistry,
        hardware: Arc<dyn HardwareProvider>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            interpreters,
            xsensors: Arc::new(XSensorRegistry::new()),
            hardware,
            sink,
            state: Arc::new(Mutex::new(RunState::Idle)),
            generation: Arc::new(AtomicU64::new(0)),
            active: tokio::sync::Mutex::new(None),
        }
    }

    /// The process-wide X-sensor cache. Persists across runs so values
    /// pushed before a script starts are visible to it.
    pub fn xsensors(&self) -> &Arc<XSensorRegistry> {
        &self.xsensors
    }

    pub fn run_state(&self) -> RunState {
        *self.state.lock()
    }

    /// Start a script.
    ///
    /// Fails with `ScriptAlreadyRunning` when a script is running and
    /// `force_stop_if_busy` is false; otherwise the running script is
    /// stopped (with its own configured grace period) before the new one
    /// launches. An unknown language fails before any hardware is touched.
    pub async fn start(
        &self,
        language: &str,
        source: &str,
        force_stop_if_busy: bool,
        origin: SessionId,
    ) -> Result<(), BrickError> {
        let mut active = self.active.lock().await;
        if let Some(run) = active.as_ref() {
            if !run.finished() {
                if !force_stop_if_busy {
                    return Err(BrickError::ScriptAlreadyRunning);
                }
                warn!("a script is already running, stopping it before the new submission");
                let grace = run.ctx.grace_timeout();
                let _ = self.stop_locked(&mut active, grace).await;
            }
        }

        let interpreter = self.interpreters.get(language)?;

        // Stale handles from a previous run must not leak into this one.
        release_quietly(self.hardware.as_ref());

        let ctx = Arc::new(ScriptContext::new(
            origin,
            Arc::clone(&self.sink),
            Arc::clone(&self.xsensors),
            Arc::clone(&self.hardware),
        ));
        let finished = Arc::new(AtomicBool::new(false));
        let run_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.lock() = RunState::Running;
        info!(language, "starting script");

        let run_ctx = Arc::clone(&ctx);
        let run_finished = Arc::clone(&finished);
        let sink = Arc::clone(&self.sink);
        let hardware = Arc::clone(&self.hardware);
        let state = Arc::clone(&self.state);
        let generation = Arc::clone(&self.generation);
        let source = source.to_string();
        let _join = tokio::task::spawn_blocking(move || {
            sink.emit(OutboundEnvelope::broadcast(protocol::info_coded_frame(
                protocol::CODE_SCRIPT_STARTING,
                Map::new(),
            )));
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                interpreter.evaluate(&source, Arc::clone(&run_ctx))
            }));
            match result {
                Ok(Ok(())) if !run_ctx.killed() => {
                    sink.emit(OutboundEnvelope::broadcast(protocol::info_coded_frame(
                        protocol::CODE_SCRIPT_ENDED,
                        Map::new(),
                    )));
                }
                // Forced termination: the stop path already told everyone.
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "script failed");
                    sink.emit(OutboundEnvelope::unicast(origin, protocol::exception_frame(&e)));
                }
                Err(panic) => {
                    let detail = panic
                        .downcast_ref::<&str>()
                        .map(ToString::to_string)
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "script thread panicked".into());
                    error!(detail = %detail, "unexpected error in script thread");
                    let err = BrickError::UnexpectedError { detail };
                    sink.emit(OutboundEnvelope::unicast(origin, protocol::exception_frame(&err)));
                }
            }
            // A thread that survived the forced termination window may get
            // here after a newer run has started; the newer run owns the
            // hardware and the state by then.
            if generation.load(Ordering::SeqCst) == run_generation {
                release_quietly(hardware.as_ref());
                *state.lock() = RunState::Idle;
            }
            run_finished.store(true, Ordering::Release);
        });

        *active = Some(ActiveRun { ctx, finished });
        Ok(())
    }

    /// Stop the running script; no-op when idle. Returns whether the stop
    /// had to be forced. Completes in bounded time regardless of what the
    /// script does.
    pub async fn stop(&self, grace: Duration) -> bool {
        let mut active = self.active.lock().await;
        self.stop_locked(&mut active, grace).await
    }

    /// Stop using the running script's own configured grace period.
    pub async fn stop_with_configured_grace(&self) -> bool {
        let mut active = self.active.lock().await;
        let grace = active
            .as_ref()
            .map_or(ScriptConfig::default().grace_timeout, |run| run.ctx.grace_timeout());
        self.stop_locked(&mut active, grace).await
    }

    async fn stop_locked(&self, active: &mut Option<ActiveRun>, grace: Duration) -> bool {
        let Some(run) = active.take() else {
            return false;
        };
        if run.finished() {
            // Ended on its own; the script thread already cleaned up.
            *self.state.lock() = RunState::Idle;
            return false;
        }

        *self.state.lock() = RunState::StoppingGracefully;
        run.ctx.request_stop();

        let deadline = Instant::now() + grace;
        while !run.finished() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(STOP_POLL.min(deadline - now)).await;
        }

        let mut forced = false;
        if !run.finished() {
            warn!(grace_ms = grace.as_millis() as u64, "script ignored cooperative stop, forcing termination");
            run.ctx.kill();
            forced = true;
            self.sink.emit(OutboundEnvelope::broadcast(protocol::exception_frame(
                &BrickError::ScriptStopForced,
            )));
            let forced_deadline = Instant::now() + FORCED_EXIT_WAIT;
            while !run.finished() && Instant::now() < forced_deadline {
                tokio::time::sleep(FORCED_EXIT_POLL).await;
            }
            if !run.finished() {
                error!("script thread still alive after forced termination window");
            }
        }

        release_quietly(self.hardware.as_ref());
        *self.state.lock() = RunState::Idle;
        forced
    }
}
