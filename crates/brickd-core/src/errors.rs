//! Error taxonomy for the dispatch and script-lifecycle layers.
//!
//! Every variant maps to a stable wire code plus a `params` map so clients
//! can localize the message. Nothing here is fatal to the process: errors
//! are converted to outbound frames at the dispatcher or lifecycle boundary.

use serde_json::{Map, Value, json};

/// Typed error hierarchy for inbound-command and script-lifecycle failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BrickError {
    /// The inbound frame was not a JSON object or had no action name.
    #[error("malformed message: {detail}")]
    MalformedMessage { detail: String },

    /// A required field was absent from the action message.
    #[error("field not found: {field}")]
    FieldNotFound { field: String },

    /// A field was present but had the wrong JSON type.
    #[error("invalid format for field: {field}")]
    InvalidFieldFormat { field: String },

    /// No handler registered for the action name.
    #[error("unknown action: {action}")]
    UnknownAction { action: String },

    /// A script is already running and the caller did not ask to stop it.
    #[error("a script is already running")]
    ScriptAlreadyRunning,

    /// No interpreter registered for the requested language.
    #[error("script language not supported: {language}")]
    ScriptLanguageUnsupported { language: String },

    /// The script ignored the cooperative stop signal and was terminated.
    #[error("script stop was forced")]
    ScriptStopForced,

    /// A handler or user script failed while executing.
    #[error("handler failure: {detail}")]
    HandlerFailure { detail: String },

    /// Internal error that should not happen in normal operation.
    #[error("unexpected error: {detail}")]
    UnexpectedError { detail: String },
}

impl BrickError {
    /// Stable wire code, used as the `code` field of outbound frames.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedMessage { .. } => "MALFORMED_MESSAGE",
            Self::FieldNotFound { .. } => "MESSAGE_FIELD_NOT_FOUND",
            Self::InvalidFieldFormat { .. } => "INVALID_MESSAGE_FIELD_FORMAT",
            Self::UnknownAction { .. } => "UNKNOWN_ACTION",
            Self::ScriptAlreadyRunning => "SCRIPT_ALREADY_RUNNING",
            Self::ScriptLanguageUnsupported { .. } => "SCRIPT_LANGUAGE_NOT_SUPPORTED",
            Self::ScriptStopForced => "SCRIPT_STOP_FORCED",
            Self::HandlerFailure { .. } => "SCRIPT_ERROR",
            Self::UnexpectedError { .. } => "UNEXPECTED_ERROR",
        }
    }

    /// Localization parameters for the `params` field of outbound frames.
    pub fn params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        match self {
            Self::MalformedMessage { detail }
            | Self::HandlerFailure { detail }
            | Self::UnexpectedError { detail } => {
                let _ = params.insert("error".into(), json!(detail));
            }
            Self::FieldNotFound { field } | Self::InvalidFieldFormat { field } => {
                let _ = params.insert("field".into(), json!(field));
            }
            Self::UnknownAction { action } => {
                let _ = params.insert("action".into(), json!(action));
            }
            Self::ScriptLanguageUnsupported { language } => {
                let _ = params.insert("language".into(), json!(language));
            }
            Self::ScriptAlreadyRunning | Self::ScriptStopForced => {}
        }
        params
    }

    /// True for failures of the running script itself, serialized with
    /// `msgTyp: ScriptException` rather than plain `Exception`.
    pub fn is_script_class(&self) -> bool {
        matches!(
            self,
            Self::ScriptAlreadyRunning
                | Self::ScriptStopForced
                | Self::HandlerFailure { .. }
                | Self::UnexpectedError { .. }
        )
    }

    /// True when only the session that issued the command should be told.
    ///
    /// The single exception is a forced stop, which every connected viewer
    /// cares about.
    pub fn notify_only_caller(&self) -> bool {
        !matches!(self, Self::ScriptStopForced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            BrickError::UnknownAction { action: "x".into() }.code(),
            "UNKNOWN_ACTION"
        );
        assert_eq!(BrickError::ScriptAlreadyRunning.code(), "SCRIPT_ALREADY_RUNNING");
        assert_eq!(BrickError::ScriptStopForced.code(), "SCRIPT_STOP_FORCED");
        assert_eq!(
            BrickError::ScriptLanguageUnsupported { language: "lua".into() }.code(),
            "SCRIPT_LANGUAGE_NOT_SUPPORTED"
        );
    }

    #[test]
    fn params_carry_the_offending_name() {
        let err = BrickError::UnknownAction { action: "bogusAction".into() };
        assert_eq!(err.params().get("action"), Some(&json!("bogusAction")));

        let err = BrickError::FieldNotFound { field: "sText".into() };
        assert_eq!(err.params().get("field"), Some(&json!("sText")));
    }

    #[test]
    fn script_class_split() {
        assert!(BrickError::ScriptAlreadyRunning.is_script_class());
        assert!(BrickError::ScriptStopForced.is_script_class());
        assert!(BrickError::HandlerFailure { detail: "e".into() }.is_script_class());
        assert!(!BrickError::UnknownAction { action: "a".into() }.is_script_class());
        assert!(!BrickError::ScriptLanguageUnsupported { language: "l".into() }.is_script_class());
    }

    #[test]
    fn only_forced_stop_is_broadcast() {
        assert!(!BrickError::ScriptStopForced.notify_only_caller());
        assert!(BrickError::ScriptAlreadyRunning.notify_only_caller());
        assert!(BrickError::MalformedMessage { detail: "d".into() }.notify_only_caller());
    }
}
