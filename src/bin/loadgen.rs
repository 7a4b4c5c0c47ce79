//! Axon load generator.
//!
//! Fires a burst of synthetic events through the pipeline against a real
//! collector, then drains and prints a metrics snapshot. Useful for checking
//! batching and retry behavior against a live endpoint.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `AXON_CONFIG`: Path to the TOML config (default: "config/axon.toml")
//! - `AXON_EVENT_COUNT`: Number of burst events to emit (default: 120)
//! - `RUST_LOG`: Logging level (default: "info")

use std::env;

use serde_json::json;
use tracing::info;

use axon::{AxonConfig, Pipeline, UserProfile};

fn get_event_count() -> usize {
    env::var("AXON_EVENT_COUNT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(120)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let config = AxonConfig::load()?;
    let event_count = get_event_count();

    info!(
        base_url = %config.collector.base_url,
        batch_size = config.batching.batch_size,
        event_count = event_count,
        "Axon load generator starting"
    );

    let pipeline = Pipeline::new();
    pipeline.initialize(config)?;

    // A signin so part of the burst is identified traffic
    let mut user = UserProfile::new("loadgen-user");
    user.first_name = Some("Load".to_string());
    user.last_name = Some("Generator".to_string());
    pipeline.track_user_signup(&user);

    for i in 0..event_count {
        pipeline.track_event(
            "loadgen.burst",
            Some(json!({
                "sequence": i,
                "half": if i < event_count / 2 { "first" } else { "second" },
            })),
        );

        // Flip to anonymous halfway through the burst
        if i == event_count / 2 {
            pipeline.track_user_signout("loadgen-user");
        }
    }

    info!("Burst enqueued, draining pipeline");
    pipeline.flush().await;

    let snap = pipeline.metrics();
    info!(
        enqueued = snap.events_enqueued,
        delivered = snap.events_delivered,
        retried = snap.events_retried,
        dropped = snap.events_dropped,
        batches = snap.batches_sent,
        uptime_seconds = snap.uptime_seconds,
        "Load generation complete"
    );

    let dropped = pipeline.dropped();
    for entry in dropped.list(10) {
        info!(
            event_name = %entry.event.name,
            reason = %entry.reason,
            "Dropped event"
        );
    }

    pipeline.shutdown().await;
    Ok(())
}
