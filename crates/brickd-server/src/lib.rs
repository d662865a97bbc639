//! # WebSocket server layer
//!
//! Sessions, action dispatch, and outbound delivery:
//!
//! - [`sessions`] — registry of connected clients, unicast and broadcast
//! - [`outbox`] — outgoing notification queue drained on a fixed period
//! - [`dispatch`] — action table with a single FIFO worker for async actions
//! - [`actions`] — the built-in action handlers
//! - [`ws`] — axum WebSocket endpoint, one reader/writer pair per client
//! - [`app`] — wiring and background tasks

#![deny(unsafe_code)]

pub mod actions;
pub mod app;
pub mod dispatch;
pub mod outbox;
pub mod sessions;
pub mod ws;

pub use app::App;
pub use dispatch::{ActionDispatcher, ActionHandler, DispatchContext, HostSystem, SystemControl};
pub use outbox::Outbox;
pub use sessions::SessionRegistry;
