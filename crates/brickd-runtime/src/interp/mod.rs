//! Script interpreter seam and registry.
//!
//! Interpreters are looked up by language name at `runScript` time; an
//! unknown language fails with `ScriptLanguageUnsupported` before any
//! hardware handle is acquired. The registry supports runtime registration
//! so additional engines can be plugged in at startup; re-registering a
//! language replaces the previous engine with a warning.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use brickd_core::BrickError;

use crate::context::ScriptContext;

mod rhai_interp;

pub use rhai_interp::RhaiInterpreter;

/// One embedded scripting engine.
///
/// `evaluate` runs on the script's dedicated blocking thread and must honor
/// the context's kill signal at a bounded interval so forced termination
/// completes in bounded time.
pub trait ScriptInterpreter: Send + Sync {
    /// Language name clients pass in `sLang`.
    fn language(&self) -> &str;

    /// Evaluate the source to completion, cooperative stop, or forced abort.
    ///
    /// A forced abort is not an error here; the lifecycle manager reports it
    /// separately. Errors are user-script failures.
    fn evaluate(&self, source: &str, ctx: Arc<ScriptContext>) -> Result<(), BrickError>;
}

impl std::fmt::Debug for dyn ScriptInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptInterpreter").field("language", &self.language()).finish()
    }
}

/// Name-keyed interpreter table, built once at startup.
pub struct InterpreterRegistry {
    by_language: HashMap<String, Arc<dyn ScriptInterpreter>>,
}

impl InterpreterRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self { by_language: HashMap::new() }
    }

    /// Registry with the built-in engines.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RhaiInterpreter::new()));
        registry
    }

    /// Register an interpreter under its language name (case-insensitive).
    /// Last registration wins.
    pub fn register(&mut self, interpreter: Arc<dyn ScriptInterpreter>) {
        let key = interpreter.language().to_ascii_lowercase();
        if self.by_language.insert(key.clone(), interpreter).is_some() {
            warn!(language = %key, "replacing previously registered interpreter");
        }
    }

    /// Look up the engine for a language.
    pub fn get(&self, language: &str) -> Result<Arc<dyn ScriptInterpreter>, BrickError> {
        self.by_language
            .get(&language.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| BrickError::ScriptLanguageUnsupported { language: language.to_string() })
    }
}

impl Default for InterpreterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
