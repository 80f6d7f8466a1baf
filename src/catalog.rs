//! Known event types, modules and typed emitters for common updates.

use crate::error::Result;
use crate::hub::RealtimeHub;
use crate::types::{EventInput, UpdateEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Event type names.
pub mod event_types {
    pub const USER_REGISTERED: &str = "USER_REGISTERED";
    pub const USER_UPDATED: &str = "USER_UPDATED";
    pub const USER_DELETED: &str = "USER_DELETED";
    pub const EVENT_CREATED: &str = "EVENT_CREATED";
    pub const EVENT_UPDATED: &str = "EVENT_UPDATED";
    pub const SESSION_CREATED: &str = "SESSION_CREATED";
    pub const SESSION_UPDATED: &str = "SESSION_UPDATED";
    pub const TICKET_PURCHASED: &str = "TICKET_PURCHASED";
    pub const CHECK_IN: &str = "CHECK_IN";
    pub const ORDER_CREATED: &str = "ORDER_CREATED";
    pub const ORDER_COMPLETED: &str = "ORDER_COMPLETED";
    pub const MESSAGE_SENT: &str = "MESSAGE_SENT";
    pub const CONTENT_UPLOADED: &str = "CONTENT_UPLOADED";
    pub const TASK_UPDATED: &str = "TASK_UPDATED";
    pub const NOTIFICATION_SENT: &str = "NOTIFICATION_SENT";
    /// Sent once to each new stream; never recorded in history.
    pub const CONNECTION: &str = "connection";
}

/// Module names.
pub mod modules {
    pub const USERS: &str = "users";
    pub const EVENTS: &str = "events";
    pub const SESSIONS: &str = "sessions";
    pub const TICKETS: &str = "tickets";
    pub const CHECKINS: &str = "checkins";
    pub const ORDERS: &str = "orders";
    pub const MESSAGES: &str = "messages";
    pub const CONTENT: &str = "content";
    pub const TASKS: &str = "tasks";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const SYSTEM: &str = "system";
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckIn {
    pub user_id: String,
    pub event_id: String,
    pub ticket_id: Option<String>,
    pub location: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCompleted {
    pub order_id: String,
    pub user_id: String,
    /// Minor currency units.
    pub total: i64,
    pub currency: String,
    pub ticket_count: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSent {
    pub message_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub preview: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentUploaded {
    pub content_id: String,
    pub uploader_id: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// Thin wrappers that map common payloads onto [`RealtimeHub::broadcast`].
#[derive(Clone)]
pub struct Emitter {
    hub: Arc<RealtimeHub>,
}

impl Emitter {
    pub fn new(hub: Arc<RealtimeHub>) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &Arc<RealtimeHub> {
        &self.hub
    }

    /// A user's profile changed. `changes` is the patch that was applied.
    pub fn user_updated(&self, user_id: &str, changes: serde_json::Value) -> Arc<UpdateEvent> {
        self.hub.broadcast(
            EventInput::new(event_types::USER_UPDATED, modules::USERS, changes).with_user(user_id),
        )
    }

    pub fn check_in(
        &self,
        check_in: &CheckIn,
        session_id: Option<&str>,
    ) -> Result<Arc<UpdateEvent>> {
        let mut input = EventInput::json(event_types::CHECK_IN, modules::CHECKINS, check_in)?
            .with_user(check_in.user_id.as_str());
        if let Some(session_id) = session_id {
            input = input.with_session(session_id);
        }
        Ok(self.hub.broadcast(input))
    }

    pub fn order_completed(&self, order: &OrderCompleted) -> Result<Arc<UpdateEvent>> {
        let input = EventInput::json(event_types::ORDER_COMPLETED, modules::ORDERS, order)?
            .with_user(order.user_id.as_str());
        Ok(self.hub.broadcast(input))
    }

    /// Attributed to the recipient so per-user streams see incoming messages.
    pub fn message_sent(&self, message: &MessageSent) -> Result<Arc<UpdateEvent>> {
        let input = EventInput::json(event_types::MESSAGE_SENT, modules::MESSAGES, message)?
            .with_user(message.recipient_id.as_str());
        Ok(self.hub.broadcast(input))
    }

    pub fn content_uploaded(&self, upload: &ContentUploaded) -> Result<Arc<UpdateEvent>> {
        let input = EventInput::json(event_types::CONTENT_UPLOADED, modules::CONTENT, upload)?
            .with_user(upload.uploader_id.as_str());
        Ok(self.hub.broadcast(input))
    }
}
