//! Public pipeline API.
//!
//! A [`Pipeline`] is the process-wide ingestion instance: created once,
//! initialized once, then fed fire-and-forget tracking calls. Every tracking
//! method enqueues synchronously and returns immediately; delivery happens on
//! a background dispatcher task and is observable only through logs, metrics,
//! and the dropped-events ledger. No transport failure ever propagates back
//! through a tracking call.
//!
//! # Example
//!
//! ```rust,ignore
//! use axon::{AxonConfig, Pipeline};
//!
//! let pipeline = Pipeline::new();
//! pipeline.initialize(AxonConfig::load()?)?;
//!
//! pipeline.track_event("todo.created", Some(json!({"title": "buy milk"})));
//! pipeline.track_user_signin("user-42", None, None, None, None);
//!
//! // In tests: wait for everything to settle
//! pipeline.flush().await;
//! ```

use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{AxonConfig, ConfigError};
use crate::dispatch::{Command, Dispatcher};
use crate::dropped::DroppedEvents;
use crate::event::{Event, UserProfile};
use crate::identity::IdentityState;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::transport::{HttpTransport, Transport};

/// Handle to the running dispatcher.
struct Running {
    tx: mpsc::UnboundedSender<Command>,
    handle: JoinHandle<()>,
}

/// The event ingestion pipeline.
///
/// Thread safety: all methods take `&self`; the pipeline is meant to be
/// shared process-wide (e.g. behind an `Arc` or a `static`).
pub struct Pipeline {
    state: RwLock<Option<Running>>,
    identity: RwLock<IdentityState>,
    metrics: Arc<PipelineMetrics>,
    dropped: Arc<DroppedEvents>,
}

impl Pipeline {
    /// Create an inert pipeline. Tracking calls are warn no-ops until
    /// [`initialize`](Self::initialize) succeeds.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
            identity: RwLock::new(IdentityState::new()),
            metrics: Arc::new(PipelineMetrics::new()),
            dropped: Arc::new(DroppedEvents::new()),
        }
    }

    /// Validate the configuration and start the dispatcher with an HTTP
    /// transport. Re-initialization is a logged no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn initialize(&self, config: AxonConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::from_config(&config));
        self.start(config, transport)
    }

    /// Same as [`initialize`](Self::initialize) but with a caller-supplied
    /// transport. This is the seam tests and embedders use to stub the
    /// network.
    pub fn initialize_with_transport(
        &self,
        config: AxonConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<(), ConfigError> {
        config.validate()?;
        self.start(config, transport)
    }

    fn start(&self, config: AxonConfig, transport: Arc<dyn Transport>) -> Result<(), ConfigError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        if state.is_some() {
            info!("Pipeline already initialized, reusing instance");
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(
            rx,
            transport,
            &config,
            self.metrics.clone(),
            self.dropped.clone(),
        );
        let handle = tokio::spawn(dispatcher.run());

        info!(
            base_url = %config.collector.base_url,
            batch_size = config.batching.batch_size,
            "Pipeline initialized"
        );

        *state = Some(Running { tx, handle });
        Ok(())
    }

    /// True once `initialize` has succeeded and the dispatcher is running.
    pub fn is_initialized(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// True while the current session is identified.
    pub fn is_user_identified(&self) -> bool {
        self.identity
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_identified()
    }

    /// Track an application event. Fire-and-forget: enqueues synchronously
    /// and returns immediately. `attributes` must be a JSON object when
    /// present; anything else is dropped with a warning.
    pub fn track_event(&self, name: impl Into<String>, attributes: Option<Value>) {
        let name = name.into();

        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let Some(running) = state.as_ref() else {
            warn!(event_name = %name, "Pipeline not initialized, event tracking skipped");
            return;
        };

        let actor = self
            .identity
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .current_actor();

        if let Some(attrs) = &attributes {
            if !attrs.is_object() {
                let event = Event::new(name, attributes.clone(), actor);
                self.metrics.add_dropped(1);
                self.dropped
                    .record(event, "attributes must be a JSON object");
                return;
            }
        }

        let event = Event::new(name, attributes, actor);
        debug!(
            event_id = %event.id,
            event_name = %event.name,
            identified = event.actor_id.is_some(),
            "Event enqueued"
        );

        self.metrics.incr_enqueued();
        if running.tx.send(Command::Track(event)).is_err() {
            warn!("Dispatcher stopped, event discarded");
        }
    }

    /// Identify the user and track a signup event.
    pub fn track_user_signup(&self, user: &UserProfile) {
        if !self.is_initialized() {
            warn!(user_id = %user.id, "Pipeline not initialized, signup tracking skipped");
            return;
        }

        self.identify(&user.id);
        self.track_event("user.signup", Some(user.to_attributes()));
    }

    /// Identify the user and track a signin event.
    pub fn track_user_signin(
        &self,
        user_id: impl Into<String>,
        first_name: Option<String>,
        last_name: Option<String>,
        email: Option<String>,
        phone: Option<String>,
    ) {
        let user_id = user_id.into();
        if !self.is_initialized() {
            warn!(user_id = %user_id, "Pipeline not initialized, signin tracking skipped");
            return;
        }

        let profile = UserProfile {
            id: user_id.clone(),
            first_name,
            last_name,
            email,
            phone,
        };

        self.identify(&user_id);
        self.track_event("user.signin", Some(profile.to_attributes()));
    }

    /// Track a profile update. The identity state is left unchanged.
    pub fn track_user_update(&self, user: &UserProfile) {
        if !self.is_initialized() {
            warn!(user_id = %user.id, "Pipeline not initialized, update tracking skipped");
            return;
        }

        self.track_event("user.update", Some(user.to_attributes()));
    }

    /// Track a signout event carrying the current actor id, then flip the
    /// session back to anonymous. Events enqueued before this call keep the
    /// actor id they captured at creation.
    pub fn track_user_signout(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        if !self.is_initialized() {
            warn!(user_id = %user_id, "Pipeline not initialized, signout tracking skipped");
            return;
        }

        self.track_event(
            "user.signout",
            Some(serde_json::json!({ "id": user_id })),
        );

        self.identity
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .reset();
        info!("User signed out, session now anonymous");
    }

    fn identify(&self, user_id: &str) {
        self.identity
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .identify(user_id);
        info!(user_id = %user_id, "User identified");
    }

    /// Wait until the queue, any in-flight batch, and all scheduled retries
    /// have fully settled. Intended for tests and orderly teardown; regular
    /// callers never need it.
    pub async fn flush(&self) {
        let tx = {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            match state.as_ref() {
                Some(running) => running.tx.clone(),
                None => {
                    warn!("Pipeline not initialized, nothing to flush");
                    return;
                }
            }
        };

        let (ack, done) = oneshot::channel();
        if tx.send(Command::Flush(ack)).is_err() {
            debug!("Dispatcher stopped during flush");
            return;
        }
        if done.await.is_err() {
            debug!("Dispatcher stopped during flush");
        }
    }

    /// Stop the dispatcher. Pending events and scheduled retries are
    /// abandoned; this is the accepted teardown loss boundary.
    pub async fn shutdown(&self) {
        let running = self
            .state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(running) = running {
            let _ = running.tx.send(Command::Shutdown);
            let _ = running.handle.await;
            info!("Pipeline shut down");
        }
    }

    /// Current counter values.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Ledger of permanently dropped events.
    pub fn dropped(&self) -> Arc<DroppedEvents> {
        self.dropped.clone()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBatch;
    use crate::transport::TransportResult;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Transport that accepts everything and remembers the events it saw.
    #[derive(Default)]
    struct RecordingTransport {
        seen: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, batch: &EventBatch) -> TransportResult {
            self.seen.lock().unwrap().extend(batch.events.clone());
            TransportResult::Success
        }
    }

    fn pipeline_with_recorder() -> (Pipeline, Arc<RecordingTransport>) {
        let pipeline = Pipeline::new();
        let transport = Arc::new(RecordingTransport::default());
        pipeline
            .initialize_with_transport(AxonConfig::default(), transport.clone())
            .unwrap();
        (pipeline, transport)
    }

    #[tokio::test]
    async fn test_track_before_initialize_is_a_noop() {
        let pipeline = Pipeline::new();

        assert!(!pipeline.is_initialized());
        pipeline.track_event("ignored", None);
        pipeline.track_user_signin("user-1", None, None, None, None);
        pipeline.track_user_signout("user-1");

        assert!(!pipeline.is_user_identified());
        assert_eq!(pipeline.metrics().events_enqueued, 0);
    }

    #[tokio::test]
    async fn test_reinitialize_is_a_noop() {
        let (pipeline, transport) = pipeline_with_recorder();

        // Second initialize must not replace the running dispatcher
        pipeline.initialize(AxonConfig::default()).unwrap();

        pipeline.track_event("still.works", None);
        pipeline.flush().await;

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].name, "still.works");
    }

    #[tokio::test]
    async fn test_initialize_rejects_invalid_config() {
        let pipeline = Pipeline::new();
        let mut config = AxonConfig::default();
        config.collector.base_url = "not-a-url".to_string();

        assert!(pipeline.initialize(config).is_err());
        assert!(!pipeline.is_initialized());
    }

    #[tokio::test]
    async fn test_events_capture_identity_at_creation() {
        let (pipeline, transport) = pipeline_with_recorder();

        pipeline.track_event("before.signin", None);
        pipeline.track_user_signin("user-42", Some("Ada".into()), None, None, None);
        pipeline.track_event("while.identified", None);
        pipeline.track_user_signout("user-42");
        pipeline.track_event("after.signout", None);
        pipeline.flush().await;

        let seen = transport.seen.lock().unwrap();
        let by_name = |name: &str| seen.iter().find(|e| e.name == name).unwrap().clone();

        assert_eq!(by_name("before.signin").actor_id, None);
        assert_eq!(
            by_name("while.identified").actor_id,
            Some("user-42".to_string())
        );
        // The signout event itself still carries the actor
        assert_eq!(
            by_name("user.signout").actor_id,
            Some("user-42".to_string())
        );
        // Everything afterwards is anonymous
        assert_eq!(by_name("after.signout").actor_id, None);
        assert!(!pipeline.is_user_identified());
    }

    #[tokio::test]
    async fn test_signup_identifies_and_carries_profile() {
        let (pipeline, transport) = pipeline_with_recorder();

        let mut user = UserProfile::new("user-7");
        user.first_name = Some("Ada".into());
        user.email = Some("ada@example.com".into());

        pipeline.track_user_signup(&user);
        assert!(pipeline.is_user_identified());

        pipeline.flush().await;

        let seen = transport.seen.lock().unwrap();
        let signup = seen.iter().find(|e| e.name == "user.signup").unwrap();
        assert_eq!(signup.actor_id, Some("user-7".to_string()));
        let attrs = signup.attributes.as_ref().unwrap();
        assert_eq!(attrs["firstName"], "Ada");
        assert_eq!(attrs["email"], "ada@example.com");
    }

    #[tokio::test]
    async fn test_update_does_not_change_identity() {
        let (pipeline, transport) = pipeline_with_recorder();

        let user = UserProfile::new("user-9");
        pipeline.track_user_update(&user);

        assert!(!pipeline.is_user_identified());
        pipeline.flush().await;

        let seen = transport.seen.lock().unwrap();
        let update = seen.iter().find(|e| e.name == "user.update").unwrap();
        assert_eq!(update.actor_id, None);
    }

    #[tokio::test]
    async fn test_non_object_attributes_are_dropped() {
        let (pipeline, transport) = pipeline_with_recorder();

        pipeline.track_event("bad.attrs", Some(json!(42)));
        pipeline.flush().await;

        assert!(transport.seen.lock().unwrap().is_empty());
        assert_eq!(pipeline.metrics().events_dropped, 1);
        assert_eq!(pipeline.dropped().count(), 1);
    }

    #[tokio::test]
    async fn test_flush_before_initialize_returns_immediately() {
        let pipeline = Pipeline::new();
        pipeline.flush().await;
    }

    #[tokio::test]
    async fn test_shutdown_then_track_is_a_warn_noop() {
        let (pipeline, transport) = pipeline_with_recorder();

        pipeline.track_event("delivered", None);
        pipeline.flush().await;
        pipeline.shutdown().await;

        assert!(!pipeline.is_initialized());
        pipeline.track_event("after.shutdown", None);

        assert_eq!(transport.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_metrics_reflect_delivery() {
        let (pipeline, _transport) = pipeline_with_recorder();

        for i in 0..5 {
            pipeline.track_event(format!("e{i}"), None);
        }
        pipeline.flush().await;

        let snap = pipeline.metrics();
        assert_eq!(snap.events_enqueued, 5);
        assert_eq!(snap.events_delivered, 5);
        assert_eq!(snap.events_dropped, 0);
    }
}
