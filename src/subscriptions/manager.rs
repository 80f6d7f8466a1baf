//! Subscriber registry and event dispatch.

use crate::error::{HubError, Result};
use crate::types::{SubscriberId, UpdateEvent};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::types::{
    Callback, DispatchMode, OverflowPolicy, SubscriptionConfig, SubscriptionFilter, Unsubscribe,
};

thread_local! {
    /// Set while a subscriber callback is running on this thread.
    static IN_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

/// Run state shared between a registration and whoever invokes its callback.
struct Gate {
    active: AtomicBool,
    /// Held for the duration of each callback invocation.
    running: ReentrantMutex<()>,
}

impl Gate {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            active: AtomicBool::new(true),
            running: ReentrantMutex::new(()),
        })
    }

    /// Invoke the callback unless the registration is gone.
    /// Returns false if it was skipped.
    fn invoke(&self, id: &SubscriberId, callback: &Callback, event: Arc<UpdateEvent>) -> bool {
        let _running = self.running.lock();
        if !self.active.load(Ordering::Acquire) {
            return false;
        }

        let outer = IN_CALLBACK.with(|flag| flag.replace(true));
        let result = panic::catch_unwind(AssertUnwindSafe(|| callback(event)));
        IN_CALLBACK.with(|flag| flag.set(outer));

        if let Err(payload) = result {
            warn!(
                subscriber_id = %id,
                error = %panic_message(&*payload),
                "Subscriber callback panicked"
            );
        }
        true
    }

    /// Stop future invocations. With `wait`, also block until an in-flight
    /// invocation on another thread has returned.
    fn deactivate(&self, wait: bool) {
        self.active.store(false, Ordering::Release);
        if wait && !IN_CALLBACK.with(Cell::get) {
            drop(self.running.lock());
        }
    }
}

enum Delivery {
    Inline(Callback),
    Worker(Sender<Arc<UpdateEvent>>),
}

/// Internal subscription state.
struct Subscription {
    generation: u64,
    filter: SubscriptionFilter,
    expires_at: Option<Instant>,
    gate: Arc<Gate>,
    delivery: Delivery,
}

impl Subscription {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Deactivate and release the queue; the worker exits on its own.
    fn close(self, wait: bool) {
        self.gate.deactivate(wait);
    }
}

/// Why a subscription is being removed during a broadcast.
#[derive(Debug, Clone, Copy)]
enum DropCause {
    Expired,
    Overflow,
    Disconnected,
}

/// Tracks active subscribers by id and delivers events to them.
pub struct SubscriberRegistry {
    subscriptions: RwLock<HashMap<SubscriberId, Subscription>>,
    /// Distinguishes a registration from a later one under the same id.
    next_generation: AtomicU64,
    config: SubscriptionConfig,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl SubscriberRegistry {
    pub fn new(config: SubscriptionConfig) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            config,
            workers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    /// Register a subscriber.
    ///
    /// An existing registration with the same id is replaced. `ttl` falls
    /// back to the configured default; `None` there means no expiry.
    pub fn register(
        self: &Arc<Self>,
        id: SubscriberId,
        callback: Callback,
        filter: SubscriptionFilter,
        ttl: Option<Duration>,
    ) -> Result<Unsubscribe> {
        if self.closed.load(Ordering::Acquire) {
            return Err(HubError::ShutDown);
        }
        if id.as_str().is_empty() {
            return Err(HubError::InvalidSubscriberId(id.0));
        }

        self.prune_expired();

        let ttl = ttl.or(self.config.default_ttl_ms.map(Duration::from_millis));
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let gate = Gate::new();

        let delivery = match self.config.dispatch {
            DispatchMode::Inline => Delivery::Inline(callback),
            DispatchMode::Worker => {
                let (sender, receiver) = bounded(self.config.buffer_size.max(1));
                let handle = spawn_worker(
                    generation,
                    id.clone(),
                    callback,
                    Arc::clone(&gate),
                    receiver,
                )?;
                let mut workers = self.workers.lock();
                workers.retain(|w| !w.is_finished());
                workers.push(handle);
                Delivery::Worker(sender)
            }
        };

        let subscription = Subscription {
            generation,
            filter,
            expires_at,
            gate,
            delivery,
        };

        let replaced = {
            let mut subs = self.subscriptions.write();

            let rejection = if self.closed.load(Ordering::Acquire) {
                Some(HubError::ShutDown)
            } else {
                match self.config.max_subscribers {
                    Some(limit) if !subs.contains_key(&id) && subs.len() >= limit => {
                        Some(HubError::SubscriberLimit { limit })
                    }
                    _ => None,
                }
            };

            if let Some(err) = rejection {
                drop(subs);
                subscription.close(false);
                warn!(subscriber_id = %id, error = %err, "Subscription rejected");
                return Err(err);
            }

            subs.insert(id.clone(), subscription)
        };

        if let Some(old) = replaced {
            debug!(
                subscriber_id = %id,
                replaced_generation = old.generation,
                "Subscriber id re-registered, previous registration replaced"
            );
            old.close(false);
        }

        debug!(subscriber_id = %id, generation, "Subscriber registered");

        Ok(Unsubscribe {
            registry: Arc::downgrade(self),
            id,
            generation,
        })
    }

    /// Remove a specific registration. Returns false if it is already gone
    /// or has been replaced.
    pub(crate) fn remove(&self, id: &SubscriberId, generation: u64) -> bool {
        let removed = {
            let mut subs = self.subscriptions.write();
            if subs.get(id).is_some_and(|sub| sub.generation == generation) {
                subs.remove(id)
            } else {
                None
            }
        };

        match removed {
            Some(sub) => {
                sub.close(true);
                debug!(subscriber_id = %id, generation, "Subscriber unregistered");
                true
            }
            None => false,
        }
    }

    /// Remove whatever is registered under `id`.
    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        let removed = self.subscriptions.write().remove(id);
        match removed {
            Some(sub) => {
                sub.close(true);
                debug!(subscriber_id = %id, "Subscriber unregistered");
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_registered(&self, id: &SubscriberId, generation: u64) -> bool {
        let now = Instant::now();
        self.subscriptions
            .read()
            .get(id)
            .is_some_and(|sub| sub.generation == generation && !sub.is_expired(now))
    }

    /// Number of live (non-expired) subscribers.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.subscriptions
            .read()
            .values()
            .filter(|sub| !sub.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove expired subscribers. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(SubscriberId, Subscription)> = {
            let mut subs = self.subscriptions.write();
            let ids: Vec<SubscriberId> = subs
                .iter()
                .filter(|(_, sub)| sub.is_expired(now))
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| subs.remove(&id).map(|sub| (id, sub)))
                .collect()
        };

        let count = expired.len();
        for (id, sub) in expired {
            debug!(subscriber_id = %id, "Subscriber expired");
            sub.close(false);
        }
        count
    }

    /// Deliver an event to every matching subscriber.
    ///
    /// Returns how many subscribers the event was handed to (queued in
    /// worker mode, invoked in inline mode).
    pub fn notify(&self, event: &Arc<UpdateEvent>) -> usize {
        let now = Instant::now();
        let mut delivered = 0;
        let mut inline = Vec::new();
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if sub.is_expired(now) {
                    to_remove.push((id.clone(), sub.generation, DropCause::Expired));
                    continue;
                }
                if !sub.filter.matches(event) {
                    continue;
                }

                match &sub.delivery {
                    Delivery::Inline(callback) => {
                        inline.push((id.clone(), Arc::clone(callback), Arc::clone(&sub.gate)));
                    }
                    Delivery::Worker(sender) => match sender.try_send(Arc::clone(event)) {
                        Ok(()) => delivered += 1,
                        Err(TrySendError::Full(_)) => match self.config.overflow {
                            OverflowPolicy::DropEvent => {
                                warn!(
                                    subscriber_id = %id,
                                    event_type = %event.event_type,
                                    "Subscriber queue full, event dropped"
                                );
                            }
                            OverflowPolicy::DropSubscriber => {
                                to_remove.push((id.clone(), sub.generation, DropCause::Overflow));
                            }
                        },
                        Err(TrySendError::Disconnected(_)) => {
                            to_remove.push((id.clone(), sub.generation, DropCause::Disconnected));
                        }
                    },
                }
            }
        }

        // Remove dropped subscriptions
        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            let mut closed = Vec::with_capacity(to_remove.len());
            for (id, generation, cause) in to_remove {
                if subs.get(&id).is_some_and(|sub| sub.generation == generation) {
                    if let Some(sub) = subs.remove(&id) {
                        closed.push((id, cause, sub));
                    }
                }
            }
            drop(subs);

            for (id, cause, sub) in closed {
                match cause {
                    DropCause::Expired => debug!(subscriber_id = %id, "Subscriber expired"),
                    DropCause::Overflow => {
                        warn!(subscriber_id = %id, "Subscriber queue full, subscriber dropped")
                    }
                    DropCause::Disconnected => {
                        warn!(subscriber_id = %id, "Subscriber worker gone, subscriber dropped")
                    }
                }
                sub.close(false);
            }
        }

        for (id, callback, gate) in inline {
            if gate.invoke(&id, &callback, Arc::clone(event)) {
                delivered += 1;
            }
        }

        trace!(
            event_type = %event.event_type,
            module = %event.module,
            delivered,
            "Event dispatched"
        );

        delivered
    }

    /// Remove every subscriber and wait for worker threads to finish.
    ///
    /// Later registrations fail with `HubError::ShutDown`.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let drained: Vec<(SubscriberId, Subscription)> =
            self.subscriptions.write().drain().collect();
        let count = drained.len();
        for (_, sub) in drained {
            sub.close(false);
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        if IN_CALLBACK.with(Cell::get) {
            // A worker cannot join itself; the rest exit once their queues close.
            trace!(workers = workers.len(), "Shutdown from a callback, workers detached");
        } else {
            for handle in workers {
                if handle.join().is_err() {
                    warn!("Subscriber worker thread panicked");
                }
            }
        }

        debug!(subscribers = count, "Subscriber registry shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for SubscriberRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(
    generation: u64,
    id: SubscriberId,
    callback: Callback,
    gate: Arc<Gate>,
    receiver: Receiver<Arc<UpdateEvent>>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(format!("realtime-sub-{generation}"))
        .spawn(move || {
            for event in receiver.iter() {
                if !gate.invoke(&id, &callback, event) {
                    break;
                }
            }
            trace!(subscriber_id = %id, generation, "Subscriber worker exiting");
        })?;
    Ok(handle)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
