//! Query parameters for reading the event history.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::types::UpdateEvent;

/// Filter criteria for `EventHistory::query`.
#[derive(Clone, Debug, Default)]
pub struct HistoryQuery {
    /// Only events of these types (None = all types).
    pub types: Option<HashSet<String>>,

    /// Only events from these modules (None = all modules).
    pub modules: Option<HashSet<String>>,

    /// Only events stamped strictly after this instant.
    pub since: Option<DateTime<Utc>>,

    /// Keep only the most recent `limit` matches.
    pub limit: Option<usize>,
}

impl HistoryQuery {
    /// Match everything retained.
    pub fn all() -> Self {
        Self::default()
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

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an event passes the type, module and `since` criteria.
    ///
    /// `limit` is applied over the whole result, not per event.
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

        if let Some(since) = self.since {
            if event.timestamp <= since {
                return false;
            }
        }

        true
    }
}
