//! Live moderation events and the in-process EventBus
//!
//! Events are published after their transaction commits; subscribers (the
//! admin SSE stream, tests) never observe rolled-back work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{ReputationEventType, TagStatus};
use crate::scoring::TrustLevel;

/// Engine event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TagTrustEvent {
    /// A tag was submitted (pending, or approved by the auto-approval policy)
    #[serde(rename_all = "camelCase")]
    TagSubmitted {
        tag_id: Uuid,
        content_id: String,
        submitter_id: String,
        status: TagStatus,
        timestamp: DateTime<Utc>,
    },

    /// A pending tag was approved, rejected or withdrawn
    #[serde(rename_all = "camelCase")]
    TagDecided {
        tag_id: Uuid,
        status: TagStatus,
        decided_by: String,
        timestamp: DateTime<Utc>,
    },

    /// Vote totals on a tag changed
    #[serde(rename_all = "camelCase")]
    TagVoted {
        tag_id: Uuid,
        upvotes: i64,
        downvotes: i64,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// A reputation event was appended for a user
    #[serde(rename_all = "camelCase")]
    ReputationChanged {
        user_id: String,
        event_type: ReputationEventType,
        score_before: f64,
        score_after: f64,
        trust_before: TrustLevel,
        trust_after: TrustLevel,
        timestamp: DateTime<Utc>,
    },

    /// A name gathered enough agreement to enter the entity directory
    #[serde(rename_all = "camelCase")]
    EntityPromoted {
        entity_id: Uuid,
        canonical_name: String,
        timestamp: DateTime<Utc>,
    },

    /// A reconciliation pass finished
    #[serde(rename_all = "camelCase")]
    ReconciliationCompleted {
        users_checked: usize,
        drifted_users: usize,
        drifted_tags: usize,
        repaired: bool,
        timestamp: DateTime<Utc>,
    },
}

impl TagTrustEvent {
    /// SSE event name
    pub fn event_type_str(&self) -> &'static str {
        match self {
            TagTrustEvent::TagSubmitted { .. } => "TagSubmitted",
            TagTrustEvent::TagDecided { .. } => "TagDecided",
            TagTrustEvent::TagVoted { .. } => "TagVoted",
            TagTrustEvent::ReputationChanged { .. } => "ReputationChanged",
            TagTrustEvent::EntityPromoted { .. } => "EntityPromoted",
            TagTrustEvent::ReconciliationCompleted { .. } => "ReconciliationCompleted",
        }
    }

    /// True when the event records a change of trust level
    pub fn crosses_trust_threshold(&self) -> bool {
        matches!(
            self,
            TagTrustEvent::ReputationChanged { trust_before, trust_after, .. }
                if trust_before != trust_after
        )
    }
}

/// Broadcast bus for engine events.
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TagTrustEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per lagging subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TagTrustEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the case where nobody is listening
    pub fn emit_lossy(&self, event: TagTrustEvent) {
        let _ = self.tx.send(event);
    }
}
