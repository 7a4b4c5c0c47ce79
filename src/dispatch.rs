//! Background dispatcher - batching, delivery, retry coordination.
//!
//! One dispatcher task owns the event queue and the retry schedule. Tracking
//! calls feed it through an unbounded channel, so enqueue is synchronous and
//! the caller never awaits network completion. All delivery happens on this
//! single logical task: batches within a flush cycle go out strictly
//! sequentially, and retry timers re-enter the same loop, so transport calls
//! are never concurrent.
//!
//! Per-event lifecycle:
//!
//! ```text
//! Pending ──> InFlight ──> Delivered (terminal)
//!                 │
//!                 ├──> PendingRetry ──> InFlight ──> ...
//!                 └──> DroppedNonRetryable (terminal)
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AxonConfig;
use crate::dropped::DroppedEvents;
use crate::event::{Event, EventBatch};
use crate::metrics::PipelineMetrics;
use crate::queue::EventQueue;
use crate::retry::{backoff_delay, RetryQueue};
use crate::transport::{ErrorClass, Transport, TransportResult};

/// Messages from the pipeline facade to the dispatcher task.
pub(crate) enum Command {
    /// Buffer an event for delivery
    Track(Event),

    /// Ack once the queue, in-flight batch, and retry schedule are all empty
    Flush(oneshot::Sender<()>),

    /// Stop immediately; pending work is abandoned
    Shutdown,
}

pub(crate) struct Dispatcher {
    rx: mpsc::UnboundedReceiver<Command>,
    queue: EventQueue,
    retries: RetryQueue,
    transport: Arc<dyn Transport>,
    metrics: Arc<PipelineMetrics>,
    dropped: Arc<DroppedEvents>,

    account_id: String,
    org_id: String,
    batch_size: usize,
    base_delay: Duration,
    max_delay: Duration,

    /// Flush acks waiting for the pipeline to go fully idle
    pending_flushes: Vec<oneshot::Sender<()>>,
}

impl Dispatcher {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<Command>,
        transport: Arc<dyn Transport>,
        config: &AxonConfig,
        metrics: Arc<PipelineMetrics>,
        dropped: Arc<DroppedEvents>,
    ) -> Self {
        Self {
            rx,
            queue: EventQueue::new(),
            retries: RetryQueue::new(),
            transport,
            metrics,
            dropped,
            account_id: config.collector.account_id.clone(),
            org_id: config.collector.org_id.clone(),
            batch_size: config.batching.batch_size,
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            pending_flushes: Vec::new(),
        }
    }

    /// Main loop. Exits on `Shutdown` or when every sender is dropped.
    pub(crate) async fn run(mut self) {
        debug!(batch_size = self.batch_size, "Dispatcher started");

        'outer: loop {
            // Pull in everything already submitted before cutting a batch,
            // so a synchronous burst batches as one backlog.
            loop {
                match self.rx.try_recv() {
                    Ok(Command::Shutdown) => break 'outer,
                    Ok(cmd) => self.apply(cmd),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => break 'outer,
                }
            }

            // Retries whose backoff elapsed rejoin at the head of the queue
            let ready = self.retries.pop_due(Instant::now());
            if !ready.is_empty() {
                debug!(count = ready.len(), "Promoting due retries");
                self.queue.requeue_front(ready);
            }

            if !self.queue.is_empty() {
                self.dispatch_next_batch().await;
                continue;
            }

            self.ack_flushes_if_idle();

            // Idle: wait for the next command or the next retry deadline
            let cmd = match self.retries.next_due() {
                Some(due) => {
                    tokio::select! {
                        cmd = self.rx.recv() => match cmd {
                            Some(c) => Some(c),
                            None => break,
                        },
                        _ = time::sleep_until(due) => None,
                    }
                }
                None => match self.rx.recv().await {
                    Some(c) => Some(c),
                    None => break,
                },
            };

            match cmd {
                Some(Command::Shutdown) => break,
                Some(cmd) => self.apply(cmd),
                None => {} // retry deadline fired; handled at loop top
            }
        }

        let abandoned = self.queue.len() + self.retries.pending_events();
        if abandoned > 0 {
            // Accepted loss boundary: teardown abandons pending work
            warn!(abandoned = abandoned, "Dispatcher stopping with pending events");
        }

        // Release any callers still waiting on a flush
        for ack in self.pending_flushes.drain(..) {
            let _ = ack.send(());
        }

        info!("Dispatcher stopped");
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Track(event) => self.queue.enqueue(event),
            Command::Flush(ack) => self.pending_flushes.push(ack),
            Command::Shutdown => unreachable!("shutdown handled by the caller"),
        }
    }

    fn ack_flushes_if_idle(&mut self) {
        if self.queue.is_empty() && self.retries.is_empty() {
            for ack in self.pending_flushes.drain(..) {
                let _ = ack.send(());
            }
        }
    }

    /// Cut one batch from the head of the queue, send it, and route the
    /// outcome. The await here is what serializes batches.
    async fn dispatch_next_batch(&mut self) {
        let events = self.queue.dequeue_batch(self.batch_size);
        let batch = EventBatch::new(&self.account_id, &self.org_id, events);

        debug!(
            batch_size = batch.len(),
            queued = self.queue.len(),
            "Dispatching batch"
        );

        self.metrics.incr_batches();
        let result = self.transport.send(&batch).await;
        self.handle_result(batch.events, result);
    }

    fn handle_result(&mut self, events: Vec<Event>, result: TransportResult) {
        match result {
            TransportResult::Success => {
                self.metrics.add_delivered(events.len() as u64);
                debug!(delivered = events.len(), "Batch delivered");
            }

            TransportResult::Partial { accepted } => {
                let accepted: HashSet<Uuid> = accepted.into_iter().collect();
                let (delivered, failed): (Vec<Event>, Vec<Event>) =
                    events.into_iter().partition(|e| accepted.contains(&e.id));

                self.metrics.add_delivered(delivered.len() as u64);
                warn!(
                    delivered = delivered.len(),
                    failed = failed.len(),
                    "Partial batch acceptance"
                );

                // The collector was reachable and accepting; rejects are
                // treated as transient
                self.schedule_retries(failed, "rejected by collector");
            }

            TransportResult::Failure { class, reason } => match class {
                ErrorClass::Retryable => {
                    self.schedule_retries(events, &reason);
                }
                ErrorClass::NonRetryable => {
                    self.metrics.add_dropped(events.len() as u64);
                    for event in events {
                        self.dropped.record(event, reason.clone());
                    }
                }
            },
        }
    }

    /// Increment attempts and park events until their backoff elapses.
    /// Consecutive events with the same delay share one schedule entry so
    /// their relative order survives the heap.
    fn schedule_retries(&mut self, events: Vec<Event>, reason: &str) {
        if events.is_empty() {
            return;
        }

        self.metrics.add_retried(events.len() as u64);
        let now = Instant::now();

        let mut group: Vec<Event> = Vec::new();
        let mut group_delay: Option<Duration> = None;

        for mut event in events {
            event.attempt += 1;
            let delay = backoff_delay(event.attempt, self.base_delay, self.max_delay);

            debug!(
                event_id = %event.id,
                attempt = event.attempt,
                backoff_ms = delay.as_millis() as u64,
                reason = %reason,
                "Scheduling retry"
            );

            match group_delay {
                Some(d) if d == delay => group.push(event),
                Some(d) => {
                    self.retries.schedule(std::mem::take(&mut group), now + d);
                    group_delay = Some(delay);
                    group.push(event);
                }
                None => {
                    group_delay = Some(delay);
                    group.push(event);
                }
            }
        }

        if let Some(d) = group_delay {
            self.retries.schedule(group, now + d);
        }
    }
}
