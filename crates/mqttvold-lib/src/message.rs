//! Rotary event decoding and routing into the volume engine.
//!
//! Payloads are JSON objects as published by Zigbee2MQTT, e.g.
//! `{"action": "brightness_step_up", "action_step_size": 10}`. An empty or
//! null `action` is the end-of-gesture heartbeat and does nothing.

use std::fmt;

use serde_json::Value;

use crate::config::ActionNames;
use crate::host::AudioBackend;
use crate::volume::{VolumeEngine, VolumeState};

const ACTION_KEY: &str = "action";
const STEP_SIZE_KEY: &str = "action_step_size";

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Payload is not valid JSON.
    InvalidJson(String),
    /// Payload is valid JSON but not an object.
    NotAnObject,
    /// The object has no `action` key.
    MissingAction,
    /// A step action without an integer `action_step_size`.
    MissingStepSize(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidJson(e) => write!(f, "invalid JSON payload: {e}"),
            DecodeError::NotAnObject => write!(f, "payload is not a JSON object"),
            DecodeError::MissingAction => write!(f, "payload has no '{ACTION_KEY}' field"),
            DecodeError::MissingStepSize(action) => {
                write!(f, "'{action}' without an integer '{STEP_SIZE_KEY}'")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// A decoded rotary event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    StepUp(i64),
    StepDown(i64),
    Toggle,
    /// Empty or null action: end of a gesture.
    Idle,
    /// An action this daemon does not handle.
    Unknown(String),
}

/// Decode a raw payload using the given action names.
///
/// `action_step_size` is only read for step actions.
pub fn decode(payload: &[u8], names: &ActionNames) -> Result<Action, DecodeError> {
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    let Value::Object(obj) = value else {
        return Err(DecodeError::NotAnObject);
    };
    let action = obj.get(ACTION_KEY).ok_or(DecodeError::MissingAction)?;

    let name = match action {
        Value::Null => return Ok(Action::Idle),
        Value::String(s) if s.is_empty() => return Ok(Action::Idle),
        Value::String(s) => s.as_str(),
        other => return Ok(Action::Unknown(other.to_string())),
    };

    let step_size = || {
        obj.get(STEP_SIZE_KEY)
            .and_then(Value::as_i64)
            .ok_or_else(|| DecodeError::MissingStepSize(name.to_string()))
    };

    if name == names.step_up {
        Ok(Action::StepUp(step_size()?))
    } else if name == names.step_down {
        Ok(Action::StepDown(step_size()?))
    } else if name == names.toggle {
        Ok(Action::Toggle)
    } else {
        Ok(Action::Unknown(name.to_string()))
    }
}

/// What happened to a routed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The engine changed state and issued a host command.
    Applied(VolumeState),
    /// Idle heartbeat, nothing to do.
    Idle,
    /// Unknown action, ignored.
    Ignored,
    /// Undecodable payload, or the engine could not be initialized.
    Dropped,
}

/// Routes decoded rotary events to a [`VolumeEngine`].
#[derive(Debug, Clone, Default)]
pub struct Router {
    names: ActionNames,
}

impl Router {
    pub fn new(names: ActionNames) -> Self {
        Self { names }
    }

    /// Decode `payload` and apply it to `engine`. Never fails; every problem
    /// is logged and the message is dropped.
    pub fn route<B: AudioBackend>(
        &self,
        engine: &mut VolumeEngine<B>,
        topic: &str,
        payload: &[u8],
    ) -> RouteOutcome {
        log::debug!(
            "on_mqtt: '{topic}' -> '{}'",
            String::from_utf8_lossy(payload)
        );

        let action = match decode(payload, &self.names) {
            Ok(action) => action,
            Err(e) => {
                log::error!("dropping message on '{topic}': {e}");
                return RouteOutcome::Dropped;
            }
        };

        let result = match action {
            Action::StepUp(step) => engine.adjust(step),
            Action::StepDown(step) => engine.adjust(step.saturating_neg()),
            Action::Toggle => engine.toggle_mute(),
            Action::Idle => {
                log::debug!("cmd: idle");
                return RouteOutcome::Idle;
            }
            Action::Unknown(name) => {
                log::error!("cmd: unknown '{name}'");
                return RouteOutcome::Ignored;
            }
        };

        match result {
            Ok(state) => RouteOutcome::Applied(state),
            Err(e) => {
                log::warn!("volume engine not initialized, skipping action: {e}");
                RouteOutcome::Dropped
            }
        }
    }
}
