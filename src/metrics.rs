//! Pipeline counters.
//!
//! Delivery is fire-and-forget from the caller's point of view, so these
//! counters (plus logs and the dropped-events ledger) are the only window
//! into what the pipeline actually did.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Atomic counters updated by the pipeline and dispatcher.
#[derive(Debug)]
pub struct PipelineMetrics {
    events_enqueued: AtomicU64,
    events_delivered: AtomicU64,
    events_retried: AtomicU64,
    events_dropped: AtomicU64,
    batches_sent: AtomicU64,
    start_time: Instant,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_enqueued: u64,
    pub events_delivered: u64,
    pub events_retried: u64,
    pub events_dropped: u64,
    pub batches_sent: u64,
    pub uptime_seconds: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            events_enqueued: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            events_retried: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            batches_sent: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn incr_enqueued(&self) {
        self.events_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_delivered(&self, n: u64) {
        self.events_delivered.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_retried(&self, n: u64) {
        self.events_retried.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_dropped(&self, n: u64) {
        self.events_dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr_batches(&self) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_enqueued: self.events_enqueued.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_retried: self.events_retried.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
