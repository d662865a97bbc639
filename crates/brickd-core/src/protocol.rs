//! Wire protocol: inbound action frames and outbound notification frames.
//!
//! One JSON object per WebSocket text frame, both directions.
//!
//! Inbound: `{"act": "<actionName>", ...action-specific fields...}`.
//!
//! Outbound: `{"msgTyp": "Exception" | "ScriptException" | "InfoUser" |
//! "InfoCoded", ...}` where `Exception`-class frames carry `{code, params}`,
//! `InfoUser` carries `{txt}` and `InfoCoded` carries `{code, params}` for
//! client-side localization.

use serde_json::{Map, Value, json};

use crate::errors::BrickError;
use crate::ids::SessionId;

/// Inbound field holding the action name.
pub const FIELD_ACTION: &str = "act";
/// Outbound field holding the frame kind.
pub const FIELD_MESSAGE_TYPE: &str = "msgTyp";

/// Script submission fields of the `runScript` action.
pub const FIELD_SCRIPT_LANGUAGE: &str = "sLang";
pub const FIELD_SCRIPT_TEXT: &str = "sText";
pub const FIELD_SCRIPT_FORCE_STOP: &str = "sFStop";

/// External-sensor fields of the `setXSnsValue` action.
pub const FIELD_XSENSOR_NAME: &str = "xSnsNam";
pub const FIELD_XSENSOR_TYPE: &str = "xSnsTyp";
pub const FIELD_XSENSOR_VALUE: &str = "xSnsVal";

/// Coded notifications understood by the client.
pub const CODE_SCRIPT_STARTING: &str = "SCRIPT_STARTING";
pub const CODE_SCRIPT_ENDED: &str = "SCRIPT_ENDED";
pub const CODE_SESSION_ID: &str = "SESSION_ID";

/// A parsed inbound frame: the action name plus its remaining fields.
///
/// Created once per frame, dropped after dispatch.
#[derive(Clone, Debug)]
pub struct ActionMessage {
    action: String,
    fields: Map<String, Value>,
}

impl ActionMessage {
    /// Parse a raw text frame.
    ///
    /// Fails with [`BrickError::MalformedMessage`] when the frame is not a
    /// JSON object, and [`BrickError::FieldNotFound`] /
    /// [`BrickError::InvalidFieldFormat`] when the action name is missing
    /// or not a string.
    pub fn parse(raw: &str) -> Result<Self, BrickError> {
        let value: Value = serde_json::from_str(raw).map_err(|e| BrickError::MalformedMessage {
            detail: e.to_string(),
        })?;
        let Value::Object(fields) = value else {
            return Err(BrickError::MalformedMessage {
                detail: "frame is not a JSON object".into(),
            });
        };
        let action = match fields.get(FIELD_ACTION) {
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(BrickError::InvalidFieldFormat { field: FIELD_ACTION.into() });
            }
            None => return Err(BrickError::FieldNotFound { field: FIELD_ACTION.into() }),
        };
        Ok(Self { action, fields })
    }

    /// The action name from the `act` field.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Raw field lookup; `None` when absent.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Required string field.
    pub fn field_str(&self, name: &str) -> Result<&str, BrickError> {
        match self.field(name) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(BrickError::InvalidFieldFormat { field: name.into() }),
            None => Err(BrickError::FieldNotFound { field: name.into() }),
        }
    }

    /// Required boolean field.
    pub fn field_bool(&self, name: &str) -> Result<bool, BrickError> {
        match self.field(name) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(BrickError::InvalidFieldFormat { field: name.into() }),
            None => Err(BrickError::FieldNotFound { field: name.into() }),
        }
    }

    /// Required field of any type, cloned out of the message.
    pub fn field_required(&self, name: &str) -> Result<Value, BrickError> {
        self.field(name)
            .cloned()
            .ok_or_else(|| BrickError::FieldNotFound { field: name.into() })
    }
}

/// An outbound frame waiting for delivery.
///
/// `target: None` means broadcast to every registered session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundEnvelope {
    pub target: Option<SessionId>,
    pub payload: String,
}

impl OutboundEnvelope {
    /// Frame addressed to a single session.
    pub fn unicast(target: SessionId, payload: String) -> Self {
        Self { target: Some(target), payload }
    }

    /// Frame for every currently registered session.
    pub fn broadcast(payload: String) -> Self {
        Self { target: None, payload }
    }
}

/// Build an `InfoUser` frame carrying free text from the running script.
pub fn info_user_frame(text: &str) -> String {
    json!({ FIELD_MESSAGE_TYPE: "InfoUser", "txt": text }).to_string()
}

/// Build an `InfoCoded` frame, translated client-side from its code.
pub fn info_coded_frame(code: &str, params: Map<String, Value>) -> String {
    json!({ FIELD_MESSAGE_TYPE: "InfoCoded", "code": code, "params": params }).to_string()
}

/// Build an `Exception` / `ScriptException` frame from an error.
pub fn exception_frame(err: &BrickError) -> String {
    let msg_type = if err.is_script_class() { "ScriptException" } else { "Exception" };
    json!({
        FIELD_MESSAGE_TYPE: msg_type,
        "code": err.code(),
        "params": err.params(),
    })
    .to_string()
}

/// The hello frame sent to a client right after it connects, carrying the
/// session id the server allocated for it.
pub fn session_id_frame(id: SessionId) -> String {
    let mut params = Map::new();
    let _ = params.insert("id".into(), json!(id.to_string()));
    info_coded_frame(CODE_SESSION_ID, params)
}
