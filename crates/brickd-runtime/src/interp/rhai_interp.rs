//! Rhai interpreter binding.
//!
//! The host API registered for scripts:
//!
//! - `isRunning()` — cooperative poll, loop condition for long scripts
//! - `sleep(seconds)` — interruptible wait (int or float seconds)
//! - `message(text)` — `InfoUser` frame to every connected client
//! - `xSensorValue(name)` — current decoded X-sensor value as an object map
//! - `setIsRunningWait(ms)`, `setCheckEscapeKey(flag)`,
//!   `setStopGraceTimeout(ms)` — per-run configuration, clamped
//!
//! Forced termination uses the engine's progress callback: the kill signal
//! is observed between VM operations, so even `while true {}` aborts within
//! a bounded number of instructions.

use std::sync::Arc;

use rhai::{Dynamic, Engine, EvalAltResult, ImmutableString};
use tracing::debug;

use brickd_core::BrickError;

use crate::context::ScriptContext;
use crate::interp::ScriptInterpreter;

/// The built-in scripting engine.
pub struct RhaiInterpreter;

impl RhaiInterpreter {
    pub fn new() -> Self {
        Self
    }

    /// Build an engine bound to one run's context.
    fn build_engine(ctx: &Arc<ScriptContext>) -> Engine {
        let mut engine = Engine::new();

        let kill_watch = Arc::clone(ctx);
        engine.on_progress(move |_ops| {
            if kill_watch.killed() {
                Some(Dynamic::UNIT)
            } else {
                None
            }
        });

        let c = Arc::clone(ctx);
        engine.register_fn("isRunning", move || c.is_running());

        let c = Arc::clone(ctx);
        engine.register_fn("sleep", move |seconds: f64| c.sleep_secs(seconds));
        let c = Arc::clone(ctx);
        engine.register_fn("sleep", move |seconds: i64| c.sleep_secs(seconds as f64));

        let c = Arc::clone(ctx);
        engine.register_fn("message", move |text: ImmutableString| c.message(text.as_str()));

        let c = Arc::clone(ctx);
        engine.register_fn("xSensorValue", move |name: ImmutableString| -> Dynamic {
            rhai::serde::to_dynamic(c.xsensor_json(name.as_str())).unwrap_or(Dynamic::UNIT)
        });

        let c = Arc::clone(ctx);
        engine.register_fn("setIsRunningWait", move |ms: i64| c.set_is_running_wait_ms(ms));
        let c = Arc::clone(ctx);
        engine.register_fn("setCheckEscapeKey", move |check: bool| c.set_check_escape_key(check));
        let c = Arc::clone(ctx);
        engine.register_fn("setStopGraceTimeout", move |ms: i64| c.set_grace_timeout_ms(ms));

        engine
    }
}

impl Default for RhaiInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptInterpreter for RhaiInterpreter {
    fn language(&self) -> &str {
        "rhai"
    }

    fn evaluate(&self, source: &str, ctx: Arc<ScriptContext>) -> Result<(), BrickError> {
        let engine = Self::build_engine(&ctx);
        match engine.run(source) {
            Ok(()) => Ok(()),
            // A progress-callback abort is the forced-stop path, reported
            // by the lifecycle manager, not a script failure.
            Err(e) if matches!(*e, EvalAltResult::ErrorTerminated(..)) => {
                debug!("script evaluation terminated by kill signal");
                Ok(())
            }
            Err(e) => Err(BrickError::HandlerFailure { detail: e.to_string() }),
        }
    }
}
