//! Domain models shared by the engine and its API
//!
//! Four persisted collections: tags, votes, reputation records and
//! reputation events, plus the entity directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::scoring::{self, TrustLevel};
use crate::Error;

/// Moderation state of a tag.
///
/// `Pending` may move to any of the other three; all others are terminal.
/// `Withdrawn` tags are deleted, so the state only appears in responses and
/// the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagStatus {
    Pending,
    Approved,
    Rejected,
    Withdrawn,
}

impl TagStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagStatus::Pending => "pending",
            TagStatus::Approved => "approved",
            TagStatus::Rejected => "rejected",
            TagStatus::Withdrawn => "withdrawn",
        }
    }

    /// Legal moderation transitions
    pub fn can_transition_to(&self, next: TagStatus) -> bool {
        matches!(
            (self, next),
            (TagStatus::Pending, TagStatus::Approved)
                | (TagStatus::Pending, TagStatus::Rejected)
                | (TagStatus::Pending, TagStatus::Withdrawn)
        )
    }

    /// Votes are taken while a tag is pending and after it is approved
    pub fn accepts_votes(&self) -> bool {
        matches!(self, TagStatus::Pending | TagStatus::Approved)
    }
}

impl fmt::Display for TagStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TagStatus::Pending),
            "approved" => Ok(TagStatus::Approved),
            "rejected" => Ok(TagStatus::Rejected),
            "withdrawn" => Ok(TagStatus::Withdrawn),
            other => Err(Error::Validation(format!("Unknown tag status: {}", other))),
        }
    }
}

/// How a tag's free-text name relates to the entity directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityRef {
    /// No canonical entity agrees with this name yet
    Unresolved { name: String },
    /// Name resolved to a directory entry
    #[serde(rename_all = "camelCase")]
    Resolved { entity_id: Uuid, canonical_name: String },
}

/// A user's claim that a named entity appears in a content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub content_id: String,
    pub entity_name: String,
    pub normalized_name: String,
    pub attrs: Option<serde_json::Value>,
    pub submitter_id: String,
    pub status: TagStatus,
    pub upvotes: i64,
    pub downvotes: i64,
    pub confidence: f64,
    pub entity: EntityRef,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Vote direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteDirection::Up => "up",
            VoteDirection::Down => "down",
        }
    }
}

impl FromStr for VoteDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(VoteDirection::Up),
            "down" => Ok(VoteDirection::Down),
            other => Err(Error::Validation(format!("Unknown vote direction: {}", other))),
        }
    }
}

/// One voter's opinion on one tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub tag_id: Uuid,
    pub voter_id: String,
    pub direction: VoteDirection,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-user projection over the reputation event log.
///
/// Carries no timestamps so that a replayed record compares equal to the
/// live one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationRecord {
    pub user_id: String,
    pub approved_tags: i64,
    pub rejected_tags: i64,
    pub pending_tags: i64,
    pub upvotes_received: i64,
    pub downvotes_received: i64,
    pub reputation_score: f64,
    pub trust_level: TrustLevel,
    pub auto_approve: bool,
    pub trust_override: Option<TrustLevel>,
}

impl ReputationRecord {
    /// Initial record: no history, neutral prior, `new`
    pub fn new(user_id: impl Into<String>) -> Self {
        let mut record = Self {
            user_id: user_id.into(),
            approved_tags: 0,
            rejected_tags: 0,
            pending_tags: 0,
            upvotes_received: 0,
            downvotes_received: 0,
            reputation_score: 0.0,
            trust_level: TrustLevel::New,
            auto_approve: false,
            trust_override: None,
        };
        record.rederive();
        record
    }

    pub fn decided_tags(&self) -> i64 {
        self.approved_tags + self.rejected_tags
    }

    /// Recompute score, level and auto-approve from the counters
    pub fn rederive(&mut self) {
        self.reputation_score = scoring::reputation_score(
            self.approved_tags,
            self.rejected_tags,
            self.upvotes_received,
            self.downvotes_received,
        );
        let classified = scoring::classify(self.reputation_score, self.decided_tags());
        self.trust_level = self.trust_override.unwrap_or(classified);
        self.auto_approve = self.trust_level.auto_approves();
    }
}

/// Kinds of reputation-affecting transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationEventType {
    TagSubmitted,
    TagApproved,
    TagRejected,
    TagWithdrawn,
    VoteReceived,
    TrustOverrideSet,
    TrustOverrideCleared,
}

impl ReputationEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReputationEventType::TagSubmitted => "tag_submitted",
            ReputationEventType::TagApproved => "tag_approved",
            ReputationEventType::TagRejected => "tag_rejected",
            ReputationEventType::TagWithdrawn => "tag_withdrawn",
            ReputationEventType::VoteReceived => "vote_received",
            ReputationEventType::TrustOverrideSet => "trust_override_set",
            ReputationEventType::TrustOverrideCleared => "trust_override_cleared",
        }
    }
}

impl fmt::Display for ReputationEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReputationEventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tag_submitted" => Ok(ReputationEventType::TagSubmitted),
            "tag_approved" => Ok(ReputationEventType::TagApproved),
            "tag_rejected" => Ok(ReputationEventType::TagRejected),
            "tag_withdrawn" => Ok(ReputationEventType::TagWithdrawn),
            "vote_received" => Ok(ReputationEventType::VoteReceived),
            "trust_override_set" => Ok(ReputationEventType::TrustOverrideSet),
            "trust_override_cleared" => Ok(ReputationEventType::TrustOverrideCleared),
            other => Err(Error::Internal(format!("Unknown reputation event type: {}", other))),
        }
    }
}

/// Immutable record of one reputation transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationEvent {
    pub seq: i64,
    pub user_id: String,
    pub event_type: ReputationEventType,
    pub score_before: f64,
    pub score_after: f64,
    pub trust_before: TrustLevel,
    pub trust_after: TrustLevel,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Canonical entity promoted into the directory once independent
/// submitters agree on a name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: Uuid,
    pub canonical_name: String,
    pub normalized_name: String,
    pub supporting_submitters: i64,
    pub created_at: DateTime<Utc>,
}
