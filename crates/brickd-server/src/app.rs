//! Wiring: one [`App`] owns every long-lived component and the background
//! tasks binding them together.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio_util::sync::CancellationToken;

use brickd_runtime::{EventSink, HardwareProvider, InterpreterRegistry, ScriptManager};

use crate::actions;
use crate::dispatch::{ActionDispatcher, DispatchContext, SystemControl};
use crate::outbox::{self, Outbox};
use crate::sessions::SessionRegistry;
use crate::ws;

/// The assembled daemon, minus the listening socket.
pub struct App {
    pub sessions: Arc<SessionRegistry>,
    pub outbox: Arc<Outbox>,
    pub scripts: Arc<ScriptManager>,
    pub dispatcher: Arc<ActionDispatcher>,
    /// Fires when the daemon should exit, whether from `shutdownGnikrap`
    /// or an external signal.
    pub shutdown: CancellationToken,
}

impl App {
    /// Wire everything up and start the background tasks: the outbound
    /// delivery loop and the async action worker.
    pub fn new(
        hardware: Arc<dyn HardwareProvider>,
        system: Arc<dyn SystemControl>,
    ) -> Arc<Self> {
        let shutdown = CancellationToken::new();
        let sessions = Arc::new(SessionRegistry::new());
        let outbox = Arc::new(Outbox::new());
        let scripts = Arc::new(ScriptManager::new(
            InterpreterRegistry::with_defaults(),
            hardware,
            Arc::clone(&outbox) as Arc<dyn EventSink>,
        ));

        let dispatcher = ActionDispatcher::new(Arc::new(DispatchContext {
            outbox: Arc::clone(&outbox),
            scripts: Arc::clone(&scripts),
            system,
            shutdown: shutdown.clone(),
        }));
        actions::register_builtin(&dispatcher);

        let _delivery = outbox::spawn_delivery_task(
            Arc::clone(&outbox),
            Arc::clone(&sessions),
            shutdown.clone(),
        );

        Arc::new(Self { sessions, outbox, scripts, dispatcher, shutdown })
    }

    /// The HTTP router: a single WebSocket endpoint.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new().route("/ws", get(ws::ws_handler)).with_state(Arc::clone(self))
    }
}
