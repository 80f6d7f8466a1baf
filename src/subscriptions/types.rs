//! Subscription types for live hub updates.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Weak};

use super::manager::SubscriberRegistry;
use crate::types::{SubscriberId, UpdateEvent};

/// Callback invoked with each delivered event.
pub type Callback = Arc<dyn Fn(Arc<UpdateEvent>) + Send + Sync + 'static>;

/// How callbacks are run when an event is broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Each subscriber gets its own worker thread and queue.
    /// A slow callback only delays its own subscriber.
    Worker,
    /// Callbacks run on the broadcasting thread before `broadcast` returns.
    Inline,
}

/// What to do when a subscriber's queue is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Skip the event for this subscriber only.
    DropEvent,
    /// Remove the subscriber as a slow consumer.
    DropSubscriber,
}

/// Configuration for the subscriber registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    pub dispatch: DispatchMode,

    /// Max queued events per subscriber in worker mode.
    /// Default: 256
    pub buffer_size: usize,

    pub overflow: OverflowPolicy,

    /// Max registered subscribers (None = unbounded).
    pub max_subscribers: Option<usize>,

    /// TTL in milliseconds applied when `subscribe` is called without one
    /// (None = never expire).
    pub default_ttl_ms: Option<u64>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchMode::Worker,
            buffer_size: 256,
            overflow: OverflowPolicy::DropEvent,
            max_subscribers: None,
            default_ttl_ms: None,
        }
    }
}

/// Filter criteria for a subscriber.
///
/// Every dimension that is set must match; unset dimensions match anything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    /// Event types to receive (None = all types).
    pub types: Option<HashSet<String>>,

    /// Modules to receive (None = all modules).
    pub modules: Option<HashSet<String>>,

    /// Only events attributed to exactly this user.
    pub user_id: Option<String>,
}

impl SubscriptionFilter {
    /// Receive everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Receive only the given event types.
    pub fn types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::default().with_types(types)
    }

    /// Receive only events from the given modules.
    pub fn modules<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::default().with_modules(modules)
    }

    /// Receive only events attributed to `user_id`.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self::default().with_user(user_id)
    }

    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules = Some(modules.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Check if an event should be delivered under this filter.
    pub fn matches(&self, event: &UpdateEvent) -> bool {
        if let Some(ref types) = self.types {
            if !types.contains(&event.event_type) {
                return false;
            }
        }

        if let Some(ref modules) = self.modules {
            if !modules.contains(&event.module) {
                return false;
            }
        }

        if let Some(ref user_id) = self.user_id {
            if event.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }

        true
    }
}

/// Capability to remove one specific registration.
///
/// Holds only a weak reference to the registry. Dropping it does nothing;
/// use [`Unsubscribe::into_guard`] for scope-bound subscriptions.
#[derive(Clone, Debug)]
pub struct Unsubscribe {
    pub(crate) registry: Weak<SubscriberRegistry>,
    pub(crate) id: SubscriberId,
    pub(crate) generation: u64,
}

impl Unsubscribe {
    /// Id this handle was issued for.
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Remove the registration this handle was issued for.
    ///
    /// Returns true if it was still registered. Safe to call any number of
    /// times; if the id has since been re-registered, the newer entry is
    /// left alone.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(&self.id, self.generation),
            None => false,
        }
    }

    /// Whether the registration is still active.
    pub fn is_active(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.is_registered(&self.id, self.generation),
            None => false,
        }
    }

    /// Convert into a guard that unsubscribes when dropped.
    pub fn into_guard(self) -> SubscriptionGuard {
        SubscriptionGuard { handle: self }
    }
}

/// Unsubscribes when dropped.
#[derive(Debug)]
pub struct SubscriptionGuard {
    handle: Unsubscribe,
}

impl SubscriptionGuard {
    pub fn id(&self) -> &SubscriberId {
        self.handle.id()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}
