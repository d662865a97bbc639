//! Built-in action handlers.

mod run_script;
mod set_xsns_value;
mod shutdown;
mod stop_script;

use std::sync::Arc;

pub use run_script::RunScript;
pub use set_xsns_value::SetXSensorValue;
pub use shutdown::{ShutdownBrick, ShutdownServer};
pub use stop_script::StopScript;

use crate::dispatch::ActionDispatcher;

/// Register every built-in action.
pub fn register_builtin(dispatcher: &ActionDispatcher) {
    dispatcher.register(Arc::new(RunScript));
    dispatcher.register(Arc::new(StopScript));
    dispatcher.register(Arc::new(SetXSensorValue));
    dispatcher.register(Arc::new(ShutdownBrick));
    dispatcher.register(Arc::new(ShutdownServer));
}
