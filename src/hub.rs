//! Main RealtimeHub struct tying history and subscribers together.

use crate::error::{HubError, Result};
use crate::history::{EventHistory, HistoryQuery, DEFAULT_MAX_HISTORY};
use crate::subscriptions::{
    Callback, DispatchMode, OverflowPolicy, SubscriberRegistry, SubscriptionConfig,
    SubscriptionFilter, Unsubscribe,
};
use crate::types::{EventInput, SubscriberId, UpdateEvent};
use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Hub configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Events retained for catch-up queries.
    pub max_history: usize,

    /// Registry and dispatch settings.
    pub subscriptions: SubscriptionConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
            subscriptions: SubscriptionConfig::default(),
        }
    }
}

impl HubConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.subscriptions.buffer_size == 0 {
            return Err(HubError::InvalidConfig(
                "subscriptions.buffer_size must be at least 1".into(),
            ));
        }
        if self.subscriptions.max_subscribers == Some(0) {
            return Err(HubError::InvalidConfig(
                "subscriptions.max_subscribers must be at least 1 when set".into(),
            ));
        }
        if self.subscriptions.default_ttl_ms == Some(0) {
            return Err(HubError::InvalidConfig(
                "subscriptions.default_ttl_ms must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }

    pub fn with_max_history(mut self, size: usize) -> Self {
        self.max_history = size;
        self
    }

    pub fn with_dispatch(mut self, mode: DispatchMode) -> Self {
        self.subscriptions.dispatch = mode;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.subscriptions.buffer_size = size;
        self
    }

    pub fn with_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.subscriptions.overflow = policy;
        self
    }

    pub fn with_max_subscribers(mut self, limit: usize) -> Self {
        self.subscriptions.max_subscribers = Some(limit);
        self
    }

    /// Default expiry for subscribers registered without their own TTL.
    /// Stored in whole milliseconds, rounding a nonzero sub-millisecond
    /// duration up to 1.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        let mut ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        if ms == 0 && !ttl.is_zero() {
            ms = 1;
        }
        self.subscriptions.default_ttl_ms = Some(ms);
        self
    }
}

/// The realtime update hub.
///
/// Provides a unified interface for:
/// - Broadcasting events to matching subscribers
/// - Registering and removing subscribers
/// - Querying recent history for catch-up
///
/// Create one per process (or per test) with [`RealtimeHub::create`] and
/// pass the `Arc` to whatever needs it. A callback that captures the hub's
/// `Arc` keeps the hub alive until it is unsubscribed or the hub is shut
/// down explicitly.
pub struct RealtimeHub {
    config: HubConfig,

    history: Mutex<EventHistory>,

    registry: Arc<SubscriberRegistry>,

    /// Orders broadcasts so history, timestamps and delivery agree.
    /// Reentrant so an inline callback may broadcast; see `DispatchState`.
    broadcast_lock: ReentrantMutex<RefCell<DispatchState>>,
}

/// Delivery state of the thread holding `broadcast_lock`.
#[derive(Default)]
struct DispatchState {
    /// A delivery loop is running further up the stack.
    delivering: bool,
    /// Events broadcast from inside a callback, delivered once the
    /// current event has reached every subscriber.
    pending: VecDeque<Arc<UpdateEvent>>,
}

impl RealtimeHub {
    /// Create a hub with the given configuration.
    pub fn create(config: HubConfig) -> Result<Arc<Self>> {
        config.validate()?;

        debug!(
            max_history = config.max_history,
            dispatch = ?config.subscriptions.dispatch,
            max_subscribers = ?config.subscriptions.max_subscribers,
            "Realtime hub created"
        );

        Ok(Arc::new(Self {
            history: Mutex::new(EventHistory::new(config.max_history)),
            registry: Arc::new(SubscriberRegistry::new(config.subscriptions.clone())),
            broadcast_lock: ReentrantMutex::new(RefCell::new(DispatchState::default())),
            config,
        }))
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    // --- Subscribers ---

    /// Register `callback` under `id`.
    ///
    /// A registration with the same id is replaced. The returned handle
    /// removes exactly this registration.
    pub fn subscribe<F>(
        &self,
        id: impl Into<SubscriberId>,
        callback: F,
        filter: SubscriptionFilter,
    ) -> Result<Unsubscribe>
    where
        F: Fn(Arc<UpdateEvent>) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        self.registry.register(id.into(), callback, filter, None)
    }

    /// Like [`subscribe`](Self::subscribe), expiring after `ttl`.
    pub fn subscribe_with_ttl<F>(
        &self,
        id: impl Into<SubscriberId>,
        callback: F,
        filter: SubscriptionFilter,
        ttl: Duration,
    ) -> Result<Unsubscribe>
    where
        F: Fn(Arc<UpdateEvent>) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        self.registry.register(id.into(), callback, filter, Some(ttl))
    }

    /// Remove whatever is registered under `id`.
    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        self.registry.unsubscribe(id)
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Remove expired subscribers now instead of on the next broadcast.
    pub fn prune_expired(&self) -> usize {
        self.registry.prune_expired()
    }

    // --- Broadcasting ---

    /// Stamp, record and deliver an event. Returns the stamped event.
    ///
    /// After shutdown the event is still recorded but not delivered.
    /// A broadcast made from inside a callback is recorded immediately and
    /// delivered after the event being dispatched, so every subscriber sees
    /// events in history order.
    pub fn broadcast(&self, input: EventInput) -> Arc<UpdateEvent> {
        let state = self.broadcast_lock.lock();

        let event = self.history.lock().record(input);

        if self.registry.is_shut_down() {
            debug!(event_type = %event.event_type, "Hub shut down, event recorded only");
            return event;
        }

        if state.borrow().delivering {
            trace!(event_type = %event.event_type, "Nested broadcast queued");
            state.borrow_mut().pending.push_back(Arc::clone(&event));
            return event;
        }

        state.borrow_mut().delivering = true;
        let mut next = Some(Arc::clone(&event));
        while let Some(current) = next {
            let delivered = self.registry.notify(&current);
            debug!(
                event_type = %current.event_type,
                module = %current.module,
                delivered,
                "Event broadcast"
            );
            next = state.borrow_mut().pending.pop_front();
        }
        state.borrow_mut().delivering = false;

        event
    }

    // --- History ---

    /// Recent events matching `query`, oldest first.
    pub fn recent_events(&self, query: &HistoryQuery) -> Vec<Arc<UpdateEvent>> {
        self.history.lock().query(query)
    }

    /// Distinct modules among retained events.
    pub fn active_modules(&self) -> Vec<String> {
        self.history.lock().active_modules()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    // --- Lifecycle ---

    /// Remove all subscribers and stop their workers. Idempotent.
    pub fn shutdown(&self) {
        self.registry.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.registry.is_shut_down()
    }
}

impl Drop for RealtimeHub {
    fn drop(&mut self) {
        self.shutdown();
    }
}
