//! `setXSnsValue`: push an external sensor reading.

use async_trait::async_trait;

use brickd_core::{ActionMessage, BrickError, SessionId, protocol};

use crate::dispatch::{ActionHandler, DispatchContext};

/// Stores the latest value of one X-sensor. Synchronous and hot: browsers
/// stream these at sensor rate, so it must not queue behind a running
/// `runScript`.
pub struct SetXSensorValue;

#[async_trait]
impl ActionHandler for SetXSensorValue {
    fn name(&self) -> &str {
        "setXSnsValue"
    }

    fn is_async(&self) -> bool {
        false
    }

    async fn process(
        &self,
        msg: ActionMessage,
        _session: SessionId,
        ctx: &DispatchContext,
    ) -> Result<(), BrickError> {
        let name = msg.field_str(protocol::FIELD_XSENSOR_NAME)?;
        let sensor_type = msg.field_str(protocol::FIELD_XSENSOR_TYPE)?;
        let value = msg.field_required(protocol::FIELD_XSENSOR_VALUE)?;
        ctx.scripts.xsensors().set_value(name, sensor_type, value);
        Ok(())
    }
}
