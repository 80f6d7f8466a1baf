//! # Realtime Hub
//!
//! In-process fan-out of back-office updates (registrations, check-ins,
//! orders, messages) to interested subscribers, with a bounded history
//! for late joiners.
//!
//! ## Core Concepts
//!
//! - **Events**: `type` + `module` tagged payloads, stamped with server time
//! - **Subscribers**: callbacks registered under an id with an optional filter
//! - **History**: FIFO ring buffer of the most recent events
//! - **Streams**: SSE framing adapter over a throwaway subscriber
//!
//! ## Example
//!
//! ```ignore
//! use aivent_realtime::{EventInput, HistoryQuery, HubConfig, RealtimeHub, SubscriptionFilter};
//!
//! let hub = RealtimeHub::create(HubConfig::default())?;
//!
//! let handle = hub.subscribe(
//!     "orders-dashboard",
//!     |event| println!("{} at {}", event.event_type, event.timestamp),
//!     SubscriptionFilter::modules(["orders"]),
//! )?;
//!
//! hub.broadcast(EventInput::new("ORDER_COMPLETED", "orders", json!({ "orderId": "o-1" })));
//!
//! // Catch up on what happened before subscribing
//! let recent = hub.recent_events(&HistoryQuery::all().limit(20));
//!
//! handle.unsubscribe();
//! hub.shutdown();
//! ```

pub mod catalog;
pub mod error;
pub mod history;
pub mod hub;
pub mod stream;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use catalog::{CheckIn, ContentUploaded, Emitter, MessageSent, OrderCompleted};
pub use error::{HubError, Result};
pub use history::{EventHistory, HistoryQuery, DEFAULT_MAX_HISTORY};
pub use hub::{HubConfig, RealtimeHub};
pub use stream::{sse_frame, EventStream};
pub use subscriptions::{
    Callback, DispatchMode, OverflowPolicy, SubscriberRegistry, SubscriptionConfig,
    SubscriptionFilter, SubscriptionGuard, Unsubscribe,
};
pub use types::*;
