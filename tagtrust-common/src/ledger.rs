//! Reputation fold
//!
//! A `ReputationRecord` is a projection over its user's event log. The live
//! ledger and the replay both go through [`apply_event`], so a replayed
//! record is bit-for-bit equal to the stored one.

use serde_json::Value;

use crate::models::{ReputationEvent, ReputationEventType, ReputationRecord, VoteDirection};
use crate::scoring::TrustLevel;
use crate::{Error, Result};

/// Counter changes implied by one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDelta {
    pub approved: i64,
    pub rejected: i64,
    pub pending: i64,
    pub upvotes: i64,
    pub downvotes: i64,
}

impl CounterDelta {
    /// Derive the delta from the event type and its metadata
    pub fn for_event(event_type: ReputationEventType, metadata: &Value) -> Result<Self> {
        let delta = match event_type {
            ReputationEventType::TagSubmitted => CounterDelta {
                pending: 1,
                ..Default::default()
            },
            ReputationEventType::TagApproved => CounterDelta {
                pending: -1,
                approved: 1,
                ..Default::default()
            },
            ReputationEventType::TagRejected => CounterDelta {
                pending: -1,
                rejected: 1,
                ..Default::default()
            },
            ReputationEventType::TagWithdrawn => CounterDelta {
                pending: -1,
                upvotes: -metadata_count(metadata, "upvotes_removed")?,
                downvotes: -metadata_count(metadata, "downvotes_removed")?,
                ..Default::default()
            },
            ReputationEventType::VoteReceived => {
                let mut delta = CounterDelta::default();
                if let Some(previous) = metadata_direction(metadata, "previous")? {
                    delta.add_vote(previous, -1);
                }
                let direction = metadata_direction(metadata, "direction")?.ok_or_else(|| {
                    Error::Internal("vote_received event without direction".to_string())
                })?;
                delta.add_vote(direction, 1);
                delta
            }
            ReputationEventType::TrustOverrideSet | ReputationEventType::TrustOverrideCleared => {
                CounterDelta::default()
            }
        };
        Ok(delta)
    }

    fn add_vote(&mut self, direction: VoteDirection, amount: i64) {
        match direction {
            VoteDirection::Up => self.upvotes += amount,
            VoteDirection::Down => self.downvotes += amount,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == CounterDelta::default()
    }
}

fn metadata_count(metadata: &Value, key: &str) -> Result<i64> {
    match metadata.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| Error::Internal(format!("event metadata '{}' is not an integer", key))),
    }
}

fn metadata_direction(metadata: &Value, key: &str) -> Result<Option<VoteDirection>> {
    match metadata.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s.parse().map(Some),
        Some(_) => Err(Error::Internal(format!("event metadata '{}' is not a string", key))),
    }
}

fn metadata_override(metadata: &Value) -> Result<TrustLevel> {
    match metadata.get("level") {
        Some(Value::String(s)) => s.parse(),
        _ => Err(Error::Internal("trust_override_set event without level".to_string())),
    }
}

/// Apply one event to a record and rederive score, level and auto-approve
pub fn apply_event(
    record: &mut ReputationRecord,
    event_type: ReputationEventType,
    metadata: &Value,
) -> Result<()> {
    let delta = CounterDelta::for_event(event_type, metadata)?;
    record.approved_tags += delta.approved;
    record.rejected_tags += delta.rejected;
    record.pending_tags += delta.pending;
    record.upvotes_received += delta.upvotes;
    record.downvotes_received += delta.downvotes;

    match event_type {
        ReputationEventType::TrustOverrideSet => {
            record.trust_override = Some(metadata_override(metadata)?);
        }
        ReputationEventType::TrustOverrideCleared => record.trust_override = None,
        _ => {}
    }

    if record.pending_tags < 0
        || record.upvotes_received < 0
        || record.downvotes_received < 0
    {
        return Err(Error::Internal(format!(
            "reputation counters for '{}' went negative after {}",
            record.user_id, event_type
        )));
    }

    record.rederive();
    Ok(())
}

/// Fold a user's ordered events onto the initial record
pub fn replay<'a, I>(user_id: &str, events: I) -> Result<ReputationRecord>
where
    I: IntoIterator<Item = &'a ReputationEvent>,
{
    let mut record = ReputationRecord::new(user_id);
    for event in events {
        if event.user_id != user_id {
            return Err(Error::Internal(format!(
                "event #{} belongs to '{}', not '{}'",
                event.seq, event.user_id, user_id
            )));
        }
        apply_event(&mut record, event.event_type, &event.metadata)?;
    }
    Ok(record)
}
