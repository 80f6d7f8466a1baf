//! Core types for the realtime hub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied identifier for a subscriber.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(pub String);

impl SubscriberId {
    pub fn new(id: impl Into<String>) -> Self {
        SubscriberId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", self.0)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SubscriberId {
    fn from(s: &str) -> Self {
        SubscriberId(s.to_string())
    }
}

impl From<String> for SubscriberId {
    fn from(s: String) -> Self {
        SubscriberId(s)
    }
}

/// A timestamped record of something that happened in the system.
///
/// Created only by the hub at broadcast time; the timestamp is server time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEvent {
    /// Event kind (e.g. `USER_REGISTERED`).
    #[serde(rename = "type")]
    pub event_type: String,

    /// Subsystem the event belongs to (e.g. `orders`).
    pub module: String,

    /// Opaque payload.
    pub data: serde_json::Value,

    /// When the hub accepted the event.
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl UpdateEvent {
    /// Stamp an input with the given time.
    pub(crate) fn stamp(input: EventInput, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type: input.event_type,
            module: input.module,
            data: input.data,
            timestamp,
            user_id: input.user_id,
            session_id: input.session_id,
        }
    }
}

/// Input for broadcasting an event (before the timestamp is assigned).
#[derive(Clone, Debug, PartialEq)]
pub struct EventInput {
    pub event_type: String,
    pub module: String,
    pub data: serde_json::Value,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl EventInput {
    /// Create an input with a raw JSON payload.
    pub fn new(
        event_type: impl Into<String>,
        module: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            module: module.into(),
            data,
            user_id: None,
            session_id: None,
        }
    }

    /// Create an input by serializing a payload.
    pub fn json(
        event_type: impl Into<String>,
        module: impl Into<String>,
        payload: &impl Serialize,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event_type, module, serde_json::to_value(payload)?))
    }

    /// Attribute the event to a user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach the event to an event session.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}
