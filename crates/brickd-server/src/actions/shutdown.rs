//! `shutdownBrick` and `shutdownGnikrap`: power-off and daemon exit.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use brickd_core::{ActionMessage, BrickError, SessionId};

use crate::dispatch::{ActionHandler, DispatchContext};

/// Powers the board off through [`crate::dispatch::SystemControl`].
pub struct ShutdownBrick;

#[async_trait]
impl ActionHandler for ShutdownBrick {
    fn name(&self) -> &str {
        "shutdownBrick"
    }

    fn is_async(&self) -> bool {
        false
    }

    async fn process(
        &self,
        _msg: ActionMessage,
        _session: SessionId,
        ctx: &DispatchContext,
    ) -> Result<(), BrickError> {
        ctx.system.halt_system();
        Ok(())
    }
}

/// Exits the daemon, leaving the board up. Wire name kept for client
/// compatibility. The actual stop-then-exit sequence runs on a spawned
/// task so the handler itself stays fast.
pub struct ShutdownServer;

#[async_trait]
impl ActionHandler for ShutdownServer {
    fn name(&self) -> &str {
        "shutdownGnikrap"
    }

    fn is_async(&self) -> bool {
        false
    }

    async fn process(
        &self,
        _msg: ActionMessage,
        _session: SessionId,
        ctx: &DispatchContext,
    ) -> Result<(), BrickError> {
        info!("daemon shutdown requested");
        let scripts = Arc::clone(&ctx.scripts);
        let shutdown = ctx.shutdown.clone();
        tokio::spawn(async move {
            let _ = scripts.stop_with_configured_grace().await;
            shutdown.cancel();
        });
        Ok(())
    }
}
