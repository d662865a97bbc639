//! `runScript`: submit a script for execution.

use async_trait::async_trait;

use brickd_core::{ActionMessage, BrickError, SessionId, protocol};

use crate::dispatch::{ActionHandler, DispatchContext};

/// Starts a script from `sLang` / `sText`, optionally stopping the one
/// already running when `sFStop` is set. Async: launching may first wait
/// out a full stop cycle of the previous script.
pub struct RunScript;

#[async_trait]
impl ActionHandler for RunScript {
    fn name(&self) -> &str {
        "runScript"
    }

    fn is_async(&self) -> bool {
        true
    }

    async fn process(
        &self,
        msg: ActionMessage,
        session: SessionId,
        ctx: &DispatchContext,
    ) -> Result<(), BrickError> {
        let language = msg.field_str(protocol::FIELD_SCRIPT_LANGUAGE)?;
        let source = msg.field_str(protocol::FIELD_SCRIPT_TEXT)?;
        let force_stop = msg.field_bool(protocol::FIELD_SCRIPT_FORCE_STOP)?;
        ctx.scripts.start(language, source, force_stop, session).await
    }
}
