//! Voting on tags

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tagtrust_common::db::retry_on_lock;
use tagtrust_common::events::TagTrustEvent;
use tagtrust_common::{scoring, Error, ReputationEventType, Result, Tag, VoteDirection};
use tracing::debug;
use uuid::Uuid;

use super::reputation::record_transition;
use super::Engine;
use crate::db;

/// Tag totals after a vote
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub tag_id: Uuid,
    pub direction: VoteDirection,
    pub upvotes: i64,
    pub downvotes: i64,
    pub confidence: f64,
    /// False when the voter repeated their existing vote
    pub changed: bool,
}

impl Engine {
    /// Cast or change a vote.
    ///
    /// One vote per (tag, voter); a later vote replaces the earlier one.
    /// Repeating the same direction changes nothing.
    pub async fn cast_vote(
        &self,
        tag_id: Uuid,
        voter_id: &str,
        direction: VoteDirection,
    ) -> Result<VoteOutcome> {
        let tag = {
            let mut conn = self.db.acquire().await?;
            db::tags::require_tag(&mut conn, tag_id).await?
        };
        check_votable(&tag, voter_id)?;

        // Votes move the submitter's reputation, so they serialize with it
        let _guard = self.locks.lock(&tag.submitter_id).await;
        let (outcome, events) = retry_on_lock("vote", self.settings.max_lock_wait_ms, || {
            self.cast_vote_once(tag_id, voter_id, direction)
        })
        .await?;
        self.publish(events);

        debug!(
            %tag_id,
            voter_id,
            direction = direction.as_str(),
            changed = outcome.changed,
            "Vote recorded"
        );
        Ok(outcome)
    }

    async fn cast_vote_once(
        &self,
        tag_id: Uuid,
        voter_id: &str,
        direction: VoteDirection,
    ) -> Result<(VoteOutcome, Vec<TagTrustEvent>)> {
        let mut tx = self.db.begin().await?;
        let tag = db::tags::require_tag(&mut tx, tag_id).await?;
        check_votable(&tag, voter_id)?;

        let previous = db::votes::get_vote(&mut tx, tag_id, voter_id)
            .await?
            .map(|vote| vote.direction);
        if previous == Some(direction) {
            tx.commit().await?;
            let outcome = VoteOutcome {
                tag_id,
                direction,
                upvotes: tag.upvotes,
                downvotes: tag.downvotes,
                confidence: tag.confidence,
                changed: false,
            };
            return Ok((outcome, Vec::new()));
        }

        let now = Utc::now();
        db::votes::upsert_vote(&mut tx, tag_id, voter_id, direction, now).await?;
        let (upvotes, downvotes) = db::votes::count_votes(&mut tx, tag_id).await?;
        let confidence = scoring::confidence(upvotes, downvotes);
        db::tags::update_vote_totals(&mut tx, tag_id, upvotes, downvotes, confidence).await?;

        let mut events = vec![TagTrustEvent::TagVoted {
            tag_id,
            upvotes,
            downvotes,
            confidence,
            timestamp: now,
        }];
        let metadata = json!({
            "tag_id": tag_id,
            "voter_id": voter_id,
            "previous": previous.map(|d| d.as_str()),
            "direction": direction.as_str(),
        });
        record_transition(
            &mut tx,
            &tag.submitter_id,
            ReputationEventType::VoteReceived,
            metadata,
            now,
            &mut events,
        )
        .await?;

        tx.commit().await?;
        Ok((
            VoteOutcome {
                tag_id,
                direction,
                upvotes,
                downvotes,
                confidence,
                changed: true,
            },
            events,
        ))
    }
}

fn check_votable(tag: &Tag, voter_id: &str) -> Result<()> {
    if tag.submitter_id == voter_id {
        return Err(Error::Forbidden("Cannot vote on your own tag".to_string()));
    }
    if !tag.status.accepts_votes() {
        return Err(Error::AlreadyDecided(format!(
            "Tag {} is {} and no longer accepts votes",
            tag.id, tag.status
        )));
    }
    Ok(())
}
