//! Core event types for Axon.
//!
//! An [`Event`] is created the moment a caller tracks something and carries
//! everything the collector needs: a client-generated id (stable across retry
//! attempts so the collector can deduplicate), the event name, optional
//! attributes, the actor id captured at creation time, and a timestamp.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "id": "9f1c7a2e-5f3b-4e6d-8a1b-2c3d4e5f6a7b",
//!   "name": "todo.created",
//!   "attributes": { "title": "buy milk" },
//!   "actorId": "user-42",
//!   "createdAt": "2026-08-27T10:00:00Z"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single tracked event flowing through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Client-generated id, stable across retransmission attempts
    pub id: Uuid,

    /// Event name used by the collector (e.g., "todo.created", "user.signin")
    pub name: String,

    /// Arbitrary JSON attributes (always an object when present)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,

    /// Actor id captured when the event was created; absent for anonymous events
    #[serde(rename = "actorId", skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,

    /// Creation timestamp (RFC 3339)
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    /// Transmission attempts so far; client bookkeeping, never serialized
    #[serde(skip, default)]
    pub attempt: u32,
}

impl Event {
    /// Create a new event, capturing the current actor id.
    pub fn new(
        name: impl Into<String>,
        attributes: Option<Value>,
        actor_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            attributes,
            actor_id,
            created_at: Utc::now(),
            attempt: 0,
        }
    }
}

/// One transport call's worth of events, plus the account scoping the
/// collector expects. Batches are transient: they exist only for the duration
/// of a single send attempt.
#[derive(Debug, Clone, Serialize)]
pub struct EventBatch {
    #[serde(rename = "accountId")]
    pub account_id: String,

    #[serde(rename = "orgId")]
    pub org_id: String,

    pub events: Vec<Event>,
}

impl EventBatch {
    pub fn new(
        account_id: impl Into<String>,
        org_id: impl Into<String>,
        events: Vec<Event>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            org_id: org_id.into(),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Ids of every event in the batch, in order.
    pub fn event_ids(&self) -> Vec<Uuid> {
        self.events.iter().map(|e| e.id).collect()
    }
}

/// User profile attached to signup/signin/update tracking calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,

    #[serde(rename = "firstName", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(rename = "lastName", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            first_name: None,
            last_name: None,
            email: None,
            phone: None,
        }
    }

    /// Attributes object carried on user.* events.
    pub fn to_attributes(&self) -> Value {
        // serde_json cannot fail on this shape
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
