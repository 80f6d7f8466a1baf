//! Server-Sent-Events bridge.
//!
//! An [`EventStream`] registers a throwaway subscriber whose callback turns
//! each event into a `data: <json>\n\n` frame. The transport (an HTTP
//! handler, a socket writer) pulls frames and drops the stream when the
//! client disconnects, which unsubscribes it.

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TrySendError};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog::{event_types, modules};
use crate::error::Result;
use crate::hub::RealtimeHub;
use crate::subscriptions::{SubscriptionFilter, Unsubscribe};
use crate::types::{EventInput, SubscriberId, UpdateEvent};

/// Format one event as an SSE frame.
pub fn sse_frame(event: &UpdateEvent) -> Result<String> {
    Ok(format!("data: {}\n\n", serde_json::to_string(event)?))
}

/// A live feed of SSE frames for one client.
pub struct EventStream {
    id: SubscriberId,
    frames: Receiver<String>,
    handle: Option<Unsubscribe>,
}

impl EventStream {
    /// Subscribe a new stream. The first frame is a connection event that
    /// is sent only to this stream.
    pub fn open(hub: &RealtimeHub, filter: SubscriptionFilter) -> Result<Self> {
        let id = SubscriberId::new(format!("stream-{}", Uuid::new_v4()));
        let (sender, frames) = bounded(hub.config().subscriptions.buffer_size.max(1));

        let hello = UpdateEvent::stamp(
            EventInput::new(
                event_types::CONNECTION,
                modules::SYSTEM,
                json!({ "status": "connected", "subscriberId": id.as_str() }),
            ),
            Utc::now(),
        );
        if let Err(e) = sender.try_send(sse_frame(&hello)?) {
            warn!(subscriber_id = %id, error = %e, "Failed to queue connection frame");
        }

        let stream_id = id.clone();
        let handle = hub.subscribe(
            id.clone(),
            move |event| {
                let frame = match sse_frame(&event) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(subscriber_id = %stream_id, error = %e, "Failed to encode SSE frame");
                        return;
                    }
                };
                if let Err(TrySendError::Full(_)) = sender.try_send(frame) {
                    warn!(subscriber_id = %stream_id, "SSE client not reading, frame dropped");
                }
            },
            filter,
        )?;

        debug!(subscriber_id = %id, "SSE stream opened");

        Ok(Self {
            id,
            frames,
            handle: Some(handle),
        })
    }

    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Block for the next frame. `None` once the subscription is gone and
    /// all buffered frames are read.
    pub fn next_frame(&self) -> Option<String> {
        self.frames.recv().ok()
    }

    /// `Ok(None)` on timeout; `Err` once the stream is finished.
    pub fn next_frame_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<Option<String>, RecvTimeoutError> {
        match self.frames.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn try_next_frame(&self) -> Option<String> {
        self.frames.try_recv().ok()
    }

    pub fn is_open(&self) -> bool {
        self.handle.as_ref().is_some_and(Unsubscribe::is_active)
    }

    /// Client went away; unsubscribe.
    pub fn disconnect(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.unsubscribe();
            debug!(subscriber_id = %self.id, "SSE stream closed");
        }
    }
}

impl Iterator for EventStream {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.next_frame()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubConfig;
    use crate::subscriptions::DispatchMode;

    fn decode(frame: &str) -> serde_json::Value {
        let body = frame
            .strip_prefix("data: ")
            .and_then(|f| f.strip_suffix("\n\n"))
            .expect("SSE framing");
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_frame_format() {
        let event = UpdateEvent::stamp(EventInput::new("A", "users", json!({"k": 1})), Utc::now());
        let frame = sse_frame(&event).unwrap();
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("}\n\n"));
        assert_eq!(decode(&frame)["data"]["k"], 1);
    }

    #[test]
    fn test_connection_frame_first_and_not_recorded() {
        let hub =
            RealtimeHub::create(HubConfig::default().with_dispatch(DispatchMode::Inline)).unwrap();
        let stream = EventStream::open(&hub, SubscriptionFilter::all()).unwrap();

        hub.broadcast(EventInput::new("A", "users", json!({})));

        let hello = decode(&stream.try_next_frame().unwrap());
        assert_eq!(hello["type"], "connection");
        assert_eq!(hello["data"]["subscriberId"], stream.id().as_str());

        let first = decode(&stream.try_next_frame().unwrap());
        assert_eq!(first["type"], "A");

        assert_eq!(hub.history_len(), 1);
        assert!(hub.active_modules().iter().all(|m| m != modules::SYSTEM));
    }

    #[test]
    fn test_single_slot_buffer_keeps_connection_frame() {
        let hub = RealtimeHub::create(
            HubConfig::default()
                .with_dispatch(DispatchMode::Inline)
                .with_buffer_size(1),
        )
        .unwrap();
        let stream = EventStream::open(&hub, SubscriptionFilter::all()).unwrap();

        // Buffer is full with the connection frame; this one is dropped.
        hub.broadcast(EventInput::new("A", "users", json!({})));

        let hello = decode(&stream.try_next_frame().unwrap());
        assert_eq!(hello["type"], "connection");
        assert!(stream.try_next_frame().is_none());
        assert!(stream.is_open());

        hub.broadcast(EventInput::new("B", "users", json!({})));
        assert_eq!(decode(&stream.try_next_frame().unwrap())["type"], "B");
    }

    #[test]
    fn test_drop_unsubscribes() {
        let hub =
            RealtimeHub::create(HubConfig::default().with_dispatch(DispatchMode::Inline)).unwrap();
        let stream = EventStream::open(&hub, SubscriptionFilter::all()).unwrap();
        assert_eq!(hub.subscriber_count(), 1);
        assert!(stream.is_open());

        drop(stream);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
