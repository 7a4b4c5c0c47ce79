//! In-memory event buffer.
//!
//! The [`EventQueue`] is the pipeline's holding area for events that have not
//! yet been acknowledged by the collector. It is owned exclusively by the
//! dispatcher task, so no locking is needed: all mutation happens on one
//! logical thread.
//!
//! Ordering contract: `enqueue` appends at the tail, `dequeue_batch` takes
//! from the head, and `requeue_front` puts previously dequeued events back at
//! the head so retried events go out before anything newer.

use std::collections::VecDeque;

use crate::event::Event;

/// FIFO buffer of pending events. Bounded only by memory.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
        }
    }

    /// Append an event at the tail. Never blocks, never drops.
    pub fn enqueue(&mut self, event: Event) {
        self.events.push_back(event);
    }

    /// Remove and return up to `max` events from the head, preserving order.
    pub fn dequeue_batch(&mut self, max: usize) -> Vec<Event> {
        let take = max.min(self.events.len());
        self.events.drain(..take).collect()
    }

    /// Reinsert previously dequeued events at the head, keeping their
    /// relative order, so they are resent before newer events.
    pub fn requeue_front(&mut self, events: Vec<Event>) {
        for event in events.into_iter().rev() {
            self.events.push_front(event);
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
