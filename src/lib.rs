//! # Axon Event Ingestion Client
//!
//! A buffered, batching client for shipping application events to a remote
//! collector without ever blocking the caller.
//!
//! ## Architecture
//!
//! ```text
//! Caller -> Pipeline (enqueue) -> Dispatcher -> Batches (<=50) -> HTTP Collector
//!                                      ^                              |
//!                                      └── retry w/ backoff <── failure
//! ```
//!
//! ## Modules
//!
//! - [`pipeline`]: Public API (`initialize`, `track_event`, `track_user_*`)
//! - [`event`]: Event, batch, and user profile types
//! - [`queue`]: FIFO buffer of unacknowledged events
//! - [`transport`]: HTTP delivery and outcome classification
//! - [`retry`]: Exponential backoff scheduling
//! - [`identity`]: Anonymous/identified session state
//! - [`config`]: TOML configuration with env substitution
//! - [`dropped`]: Ledger of permanently dropped events

pub mod config;
pub(crate) mod dispatch;
pub mod dropped;
pub mod event;
pub mod identity;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod transport;

// Re-export commonly used types at crate root
pub use config::AxonConfig;
pub use event::{Event, EventBatch, UserProfile};
pub use metrics::MetricsSnapshot;
pub use pipeline::Pipeline;
pub use transport::{ErrorClass, HttpTransport, Transport, TransportResult};

/// Default maximum events per transport call
pub const DEFAULT_BATCH_SIZE: usize = 50;
