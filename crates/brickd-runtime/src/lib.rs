//! # brickd-runtime
//!
//! Script execution for the brickd daemon.
//!
//! - **X-sensor cache**: [`xsensor::XSensorRegistry`] holds the most recent
//!   externally-pushed value per named virtual sensor, decoded lazily
//! - **Script context**: [`context::ScriptContext`] is the host object a
//!   running script polls for cooperative stop, sleeps through, and sends
//!   user messages through
//! - **Interpreters**: [`interp::ScriptInterpreter`] seam plus the built-in
//!   Rhai engine with bounded-interval forced abort
//! - **Hardware seam**: [`hardware::HardwareProvider`] owns handle
//!   acquisition and the release that must happen on every exit path
//! - **Lifecycle**: [`lifecycle::ScriptManager`] runs at most one script and
//!   implements two-phase (cooperative, then forced) stop
//!
//! ## Crate Position
//!
//! Depends on `brickd-core`. Depended on by `brickd-server`.

#![deny(unsafe_code)]

pub mod context;
pub mod events;
pub mod hardware;
pub mod interp;
pub mod lifecycle;
pub mod xsensor;

pub use context::{ScriptConfig, ScriptContext};
pub use events::EventSink;
pub use hardware::{HardwareError, HardwareProvider, NullHardware};
pub use interp::{InterpreterRegistry, ScriptInterpreter};
pub use lifecycle::{RunState, ScriptManager};
pub use xsensor::{XSensorRegistry, XSensorValue};
