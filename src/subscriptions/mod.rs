//! Subscriber registry for live hub updates.
//!
//! Subscribers register a callback under a caller-chosen id, optionally
//! narrowed by event type, module and user. Registrations support:
//! - Last-write-wins replacement of duplicate ids
//! - Idempotent, generation-checked unsubscribe handles
//! - Per-subscriber worker queues so a slow callback only delays itself
//! - Optional subscriber limit and TTL expiry
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(SubscriberRegistry::new(SubscriptionConfig::default()));
//!
//! let handle = registry.register(
//!     "dashboard".into(),
//!     Arc::new(|event| println!("{} {}", event.module, event.event_type)),
//!     SubscriptionFilter::modules(["orders"]),
//!     None,
//! )?;
//!
//! // Later
//! handle.unsubscribe();
//! ```

mod manager;
mod types;

pub use manager::SubscriberRegistry;
pub use types::{
    Callback, DispatchMode, OverflowPolicy, SubscriptionConfig, SubscriptionFilter,
    SubscriptionGuard, Unsubscribe,
};
