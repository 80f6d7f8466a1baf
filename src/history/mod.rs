//! Bounded history of recently broadcast events.
//!
//! Late subscribers use the history to catch up on what they missed.
//! The buffer is lossy: once full, the oldest events are evicted first.

mod buffer;
mod query;

pub use buffer::{EventHistory, DEFAULT_MAX_HISTORY};
pub use query::HistoryQuery;
