//! FIFO ring buffer of stamped events.

use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::trace;

use super::query::HistoryQuery;
use crate::types::{EventInput, UpdateEvent};

/// Default number of events retained.
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// Insertion-ordered, capacity-bounded event log.
///
/// Invariants: `len() <= max_size()`, and timestamps never decrease from
/// front to back.
#[derive(Debug)]
pub struct EventHistory {
    events: VecDeque<Arc<UpdateEvent>>,
    max_size: usize,
    /// Last timestamp handed out; the clock is clamped to it.
    last_stamp: Option<DateTime<Utc>>,
}

impl EventHistory {
    /// Create an empty history holding at most `max_size` events.
    pub fn new(max_size: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_size.min(DEFAULT_MAX_HISTORY)),
            max_size,
            last_stamp: None,
        }
    }

    /// Stamp an input with the current time and append it.
    pub fn record(&mut self, input: EventInput) -> Arc<UpdateEvent> {
        self.record_at(input, Utc::now())
    }

    /// Stamp an input with `now` (clamped to stay monotonic) and append it.
    pub fn record_at(&mut self, input: EventInput, now: DateTime<Utc>) -> Arc<UpdateEvent> {
        let timestamp = match self.last_stamp {
            Some(last) if now < last => last,
            _ => now,
        };
        self.last_stamp = Some(timestamp);

        let event = Arc::new(UpdateEvent::stamp(input, timestamp));
        self.push(Arc::clone(&event));
        event
    }

    fn push(&mut self, event: Arc<UpdateEvent>) {
        if self.max_size == 0 {
            return;
        }

        self.events.push_back(event);

        while self.events.len() > self.max_size {
            if let Some(evicted) = self.events.pop_front() {
                trace!(
                    event_type = %evicted.event_type,
                    module = %evicted.module,
                    "Evicted event from history"
                );
            }
        }
    }

    /// Events matching `query`, oldest first, truncated to the newest `limit`.
    pub fn query(&self, query: &HistoryQuery) -> Vec<Arc<UpdateEvent>> {
        let mut matched: Vec<Arc<UpdateEvent>> = self
            .events
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();

        if let Some(limit) = query.limit {
            if matched.len() > limit {
                matched.drain(..matched.len() - limit);
            }
        }

        matched
    }

    /// Distinct modules among retained events, in order of first appearance.
    pub fn active_modules(&self) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut modules = Vec::new();
        for event in &self.events {
            if seen.insert(event.module.as_str()) {
                modules.push(event.module.clone());
            }
        }
        modules
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Drop every retained event. The monotonic clamp is kept.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for EventHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}
