//! Batch transport - HTTP POST to the collector.
//!
//! The [`Transport`] trait performs one network round-trip per batch and
//! classifies the outcome. It never touches the queue; acting on the result
//! (discard, reschedule, drop) is the dispatcher's job.
//!
//! # Example
//!
//! ```rust,ignore
//! use axon::transport::HttpTransport;
//! use std::time::Duration;
//!
//! let transport = HttpTransport::new("https://collect.example.com")
//!     .with_timeout(Duration::from_secs(10))
//!     .with_retry_statuses(&[429, 503]);
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AxonConfig;
use crate::event::EventBatch;

/// Default timeout for collector requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Statuses retried by default: auth refresh races, timeouts, throttling,
/// and transient server failures.
const DEFAULT_RETRY_STATUSES: [u16; 7] = [401, 408, 429, 500, 502, 503, 504];

/// How a transport failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient; the batch is eligible for backoff retry
    Retryable,
    /// Permanent; the events are dropped
    NonRetryable,
}

/// Outcome of one transport attempt for a batch.
#[derive(Debug, Clone)]
pub enum TransportResult {
    /// Every event in the batch was accepted
    Success,

    /// The collector accepted the request but rejected some events;
    /// `accepted` names the ids that made it
    Partial { accepted: Vec<Uuid> },

    /// The whole batch failed
    Failure { class: ErrorClass, reason: String },
}

/// One network round-trip per batch. Implementations must not mutate any
/// pipeline state; they only report what happened.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, batch: &EventBatch) -> TransportResult;
}

/// Optional collector response body on 2xx.
#[derive(Debug, Default, Deserialize)]
struct CollectorResponse {
    #[serde(default)]
    rejected: Vec<Uuid>,
}

/// Reqwest-backed transport posting batches to `{base_url}/v1/events/batch`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// HTTP client (reused for connection pooling)
    client: Client,

    /// Full batch endpoint URL
    endpoint: String,

    /// Per-request timeout
    timeout: Duration,

    /// Statuses classified as retryable
    retry_statuses: HashSet<u16>,
}

impl HttpTransport {
    /// Create a transport targeting the given collector base URL.
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/v1/events/batch", base_url.as_ref().trim_end_matches('/')),
            timeout: DEFAULT_TIMEOUT,
            retry_statuses: DEFAULT_RETRY_STATUSES.into_iter().collect(),
        }
    }

    /// Build a transport from pipeline configuration.
    pub fn from_config(config: &AxonConfig) -> Self {
        Self::new(&config.collector.base_url)
            .with_timeout(config.transport_timeout())
            .with_retry_statuses(&config.retry.retry_statuses)
    }

    /// Set custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the set of retryable statuses
    pub fn with_retry_statuses(mut self, statuses: &[u16]) -> Self {
        self.retry_statuses = statuses.iter().copied().collect();
        self
    }

    /// Classify a non-2xx status. The configured retry set is the single
    /// source of retryability; everything else is permanent.
    fn classify_status(&self, status: u16) -> ErrorClass {
        if self.retry_statuses.contains(&status) {
            ErrorClass::Retryable
        } else {
            ErrorClass::NonRetryable
        }
    }
}

/// Interpret a 2xx response body. An empty or unparseable body means full
/// acceptance; a `rejected` list turns the outcome partial.
fn interpret_accepted_body(batch: &EventBatch, body: &str) -> TransportResult {
    let response: CollectorResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(_) => CollectorResponse::default(),
    };

    if response.rejected.is_empty() {
        return TransportResult::Success;
    }

    let rejected: HashSet<Uuid> = response.rejected.into_iter().collect();
    let accepted: Vec<Uuid> = batch
        .events
        .iter()
        .map(|e| e.id)
        .filter(|id| !rejected.contains(id))
        .collect();

    TransportResult::Partial { accepted }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: &EventBatch) -> TransportResult {
        debug!(
            endpoint = %self.endpoint,
            batch_size = batch.len(),
            "Sending event batch"
        );

        let result = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(batch)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    let outcome = interpret_accepted_body(batch, &body);

                    if let TransportResult::Partial { accepted } = &outcome {
                        warn!(
                            endpoint = %self.endpoint,
                            batch_size = batch.len(),
                            accepted = accepted.len(),
                            "Collector rejected part of the batch"
                        );
                    } else {
                        debug!(
                            endpoint = %self.endpoint,
                            status = %status,
                            batch_size = batch.len(),
                            "Batch accepted"
                        );
                    }

                    outcome
                } else {
                    let class = self.classify_status(status.as_u16());
                    warn!(
                        endpoint = %self.endpoint,
                        status = %status,
                        class = ?class,
                        batch_size = batch.len(),
                        "Collector returned error status"
                    );

                    TransportResult::Failure {
                        class,
                        reason: format!("collector returned status {}", status),
                    }
                }
            }
            Err(e) => {
                // Network-level failures are always transient
                warn!(
                    endpoint = %self.endpoint,
                    error = %e,
                    batch_size = batch.len(),
                    "Batch request failed"
                );

                TransportResult::Failure {
                    class: ErrorClass::Retryable,
                    reason: format!("network error: {}", e),
                }
            }
        }
    }
}
