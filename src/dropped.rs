//! Ledger of permanently dropped events.
//!
//! When a transport attempt fails with a non-retryable classification (or an
//! event never makes it into the queue, e.g. malformed attributes), the event
//! is gone for good. The original tracking call already returned, so the loss
//! can only be surfaced out-of-band: a warning log plus an entry here for
//! inspection.
//!
//! # Example
//!
//! ```rust,ignore
//! let dropped = pipeline.dropped();
//! for entry in dropped.list(10) {
//!     println!("{}: {}", entry.event.name, entry.reason);
//! }
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::event::Event;

/// Maximum entries retained; older entries are trimmed first.
const DROPPED_MAX_LEN: usize = 1000;

/// A terminally failed event and why it was dropped.
#[derive(Debug, Clone)]
pub struct DroppedEvent {
    pub event: Event,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Bounded in-memory ring of dropped events.
#[derive(Debug, Default)]
pub struct DroppedEvents {
    entries: Mutex<VecDeque<DroppedEvent>>,
}

impl DroppedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a terminal failure. Logs a warning and retains the event for
    /// later inspection, trimming the oldest entry when full.
    pub fn record(&self, event: Event, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(
            event_id = %event.id,
            event_name = %event.name,
            attempt = event.attempt,
            reason = %reason,
            "Event dropped permanently"
        );

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= DROPPED_MAX_LEN {
            entries.pop_front();
        }
        entries.push_back(DroppedEvent {
            event,
            reason,
            failed_at: Utc::now(),
        });
    }

    pub fn count(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Most recent `count` entries, oldest first.
    pub fn list(&self, count: usize) -> Vec<DroppedEvent> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let skip = entries.len().saturating_sub(count);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_list() {
        let dropped = DroppedEvents::new();
        dropped.record(Event::new("a", None, None), "status 400");
        dropped.record(Event::new("b", None, None), "bad attributes");

        assert_eq!(dropped.count(), 2);
        let entries = dropped.list(10);
        assert_eq!(entries[0].event.name, "a");
        assert_eq!(entries[1].reason, "bad attributes");
    }

    #[test]
    fn test_list_returns_most_recent() {
        let dropped = DroppedEvents::new();
        for i in 0..5 {
            dropped.record(Event::new(format!("e{i}"), None, None), "x");
        }

        let last_two = dropped.list(2);
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].event.name, "e3");
        assert_eq!(last_two[1].event.name, "e4");
    }

    #[test]
    fn test_clear() {
        let dropped = DroppedEvents::new();
        dropped.record(Event::new("a", None, None), "x");
        dropped.clear();
        assert_eq!(dropped.count(), 0);
    }
}
