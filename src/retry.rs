//! Retry scheduling - exponential backoff for failed events.
//!
//! Failed-but-retryable events leave the main queue and wait here until their
//! backoff elapses, then return to the *head* of the queue so they are resent
//! before newer events. There is no attempt cap: only a non-retryable
//! classification or a successful acknowledgment ends the cycle.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use tokio::time::Instant;

use crate::event::Event;

/// Guard on the backoff exponent so the shift cannot overflow; the
/// `max_delay` clamp takes over long before this matters.
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// Exponential backoff: `min(base * 2^attempt, max)`.
///
/// `attempt` is the event's attempt counter *after* the increment for the
/// failed transmission, so the first retry waits `base * 2`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let base_ms = base.as_millis().min(u64::MAX as u128) as u64;
    let delay_ms = base_ms.saturating_mul(1u64 << attempt.min(MAX_BACKOFF_EXPONENT));
    Duration::from_millis(delay_ms).min(max)
}

/// A group of events waiting out the same backoff interval.
#[derive(Debug)]
struct RetryEntry {
    due: Instant,
    /// Monotonic tiebreak so equal due times pop in scheduling order
    seq: u64,
    events: Vec<Event>,
}

impl PartialEq for RetryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for RetryEntry {}

impl PartialOrd for RetryEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RetryEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest due first
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Due-time ordered holding area for events awaiting retry.
#[derive(Debug, Default)]
pub struct RetryQueue {
    heap: BinaryHeap<RetryEntry>,
    next_seq: u64,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a group of events until `due`.
    pub fn schedule(&mut self, events: Vec<Event>, due: Instant) {
        if events.is_empty() {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(RetryEntry { due, seq, events });
    }

    /// Earliest due time among pending retries, if any.
    pub fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.due)
    }

    /// Remove and return every event whose backoff has elapsed, in
    /// scheduling order, ready for `requeue_front`.
    pub fn pop_due(&mut self, now: Instant) -> Vec<Event> {
        let mut ready = Vec::new();
        while let Some(entry) = self.heap.peek() {
            if entry.due > now {
                break;
            }
            // unwrap is fine: peek just succeeded
            let entry = self.heap.pop().unwrap();
            ready.extend(entry.events);
        }
        ready
    }

    /// Number of events (not entries) waiting for retry.
    pub fn pending_events(&self) -> usize {
        self.heap.iter().map(|entry| entry.events.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> Event {
        Event::new(name, None, None)
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(60);

        let mut previous = Duration::ZERO;
        for attempt in 1..=12 {
            let delay = backoff_delay(attempt, base, max);
            assert!(delay >= previous, "backoff must be non-decreasing");
            assert!(delay <= max, "backoff must stay capped");
            previous = delay;
        }

        assert_eq!(backoff_delay(1, base, max), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, base, max), Duration::from_secs(4));
        assert_eq!(backoff_delay(10, base, max), max);
    }

    #[test]
    fn test_backoff_huge_attempt_does_not_overflow() {
        let delay = backoff_delay(u32::MAX, Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(delay, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_due_respects_due_time() {
        let mut queue = RetryQueue::new();
        let now = Instant::now();

        queue.schedule(vec![named("later")], now + Duration::from_secs(10));
        queue.schedule(vec![named("sooner")], now + Duration::from_secs(1));

        assert_eq!(queue.next_due(), Some(now + Duration::from_secs(1)));
        assert!(queue.pop_due(now).is_empty());

        let ready = queue.pop_due(now + Duration::from_secs(1));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].name, "sooner");
        assert_eq!(queue.pending_events(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_due_keeps_scheduling_order_on_ties() {
        let mut queue = RetryQueue::new();
        let due = Instant::now() + Duration::from_secs(2);

        queue.schedule(vec![named("first")], due);
        queue.schedule(vec![named("second")], due);

        let ready = queue.pop_due(due);
        let names: Vec<&str> = ready.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert!(queue.is_empty());
    }
}
