//! Wire messages.
//!
//! The controller answers every poll with a JSON object:
//!
//! ```json
//! { "action": "event", "sid": "abc", "name": "blocklist", "data": ["192.0.2.1"] }
//! ```
//!
//! `sessionId` is accepted as an alias of `sid`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RemoteError;

/// Message action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Session established; carries the session id
    Connect,
    /// Named payload for listeners
    Event,
    /// Either side ends the session
    Disconnect,
    /// Nothing to deliver; poll again later
    Retry,
    /// Change the maximum poll back-off (seconds in `data`)
    SetMaxMsgInterval,
    /// Anything this client does not understand
    #[serde(other)]
    Unknown,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Event => "event",
            Self::Disconnect => "disconnect",
            Self::Retry => "retry",
            Self::SetMaxMsgInterval => "set_max_msg_interval",
            Self::Unknown => "unknown",
        }
    }
}

/// Message received from the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub action: Action,
    #[serde(default, alias = "sessionId")]
    pub sid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Message {
    /// Parses a poll response body.
    ///
    /// # Errors
    /// [`RemoteError::Protocol`] when the body is not a JSON message.
    pub fn parse(body: &str) -> Result<Self, RemoteError> {
        serde_json::from_str(body).map_err(|e| {
            let preview: String = body.chars().take(64).collect();
            RemoteError::Protocol(format!("{e} (body starts with {preview:?})"))
        })
    }
}

/// Form fields of an outgoing POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outgoing {
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// JSON-encoded payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Outgoing {
    pub fn event(name: &str, data: &Value) -> Self {
        Self {
            action: Action::Event.as_str(),
            name: Some(name.to_owned()),
            data: Some(data.to_string()),
        }
    }

    pub fn disconnect() -> Self {
        Self {
            action: Action::Disconnect.as_str(),
            name: None,
            data: None,
        }
    }
}

/// Normalizes an event payload.
///
/// Controllers send payloads either as JSON values or as strings holding JSON.
/// A string that parses as JSON is replaced by the parsed value; any other string
/// is kept as is.
pub fn decode_payload(data: Value) -> Value {
    match data {
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(parsed) => parsed,
            Err(_) => Value::String(text),
        },
        other => other,
    }
}
