//! `stopScript`: stop whatever is running.

use async_trait::async_trait;

use brickd_core::{ActionMessage, BrickError, SessionId};

use crate::dispatch::{ActionHandler, DispatchContext};

/// Two-phase stop of the current script, using the grace period the script
/// configured for itself. A no-op when nothing runs. Async: the cooperative
/// phase can last the whole grace period.
pub struct StopScript;

#[async_trait]
impl ActionHandler for StopScript {
    fn name(&self) -> &str {
        "stopScript"
    }

    fn is_async(&self) -> bool {
        true
    }

    async fn process(
        &self,
        _msg: ActionMessage,
        _session: SessionId,
        ctx: &DispatchContext,
    ) -> Result<(), BrickError> {
        let _forced = ctx.scripts.stop_with_configured_grace().await;
        Ok(())
    }
}
