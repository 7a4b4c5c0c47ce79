//! Actor identity state.
//!
//! Tracks whether the current session is anonymous or identified. Events
//! capture the actor id at creation time; a later `identify` or `reset` never
//! rewrites events that are already queued.

/// Process-wide identity state shared by every event created after a change.
#[derive(Debug, Default)]
pub struct IdentityState {
    actor_id: Option<String>,
    identified: bool,
}

impl IdentityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the session as identified. Subsequent events carry this actor id.
    pub fn identify(&mut self, actor_id: impl Into<String>) {
        self.actor_id = Some(actor_id.into());
        self.identified = true;
    }

    /// Back to anonymous. Subsequent events carry no actor id.
    pub fn reset(&mut self) {
        self.actor_id = None;
        self.identified = false;
    }

    /// Actor id to stamp onto a newly created event.
    pub fn current_actor(&self) -> Option<String> {
        self.actor_id.clone()
    }

    pub fn is_identified(&self) -> bool {
        self.identified
    }
}
