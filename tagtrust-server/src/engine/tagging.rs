//! Tag submission, withdrawal and listing

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tagtrust_common::db::retry_on_lock;
use tagtrust_common::events::TagTrustEvent;
use tagtrust_common::normalize::{validate_attrs, validate_content_id, validate_entity_name};
use tagtrust_common::{
    scoring, EntityRef, Error, ReputationEventType, Result, Tag, TagStatus,
};
use tracing::{debug, info};
use uuid::Uuid;

use super::entities::promote_if_agreed;
use super::reputation::record_transition;
use super::{Engine, AUTO_APPROVAL_ACTOR};
use crate::db;

/// A tag as submitted
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTag {
    pub content_id: String,
    pub entity_name: String,
    #[serde(default)]
    pub attrs: Option<Value>,
}

/// Who is looking at a content item's tags
#[derive(Debug, Clone, Copy)]
pub enum Viewer<'a> {
    Anonymous,
    User(&'a str),
    Admin,
}

/// Result of withdrawing a pending tag
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub tag_id: Uuid,
    pub upvotes_removed: i64,
    pub downvotes_removed: i64,
}

/// Validated submission fields
struct ValidTag {
    content_id: String,
    display_name: String,
    normalized_name: String,
    attrs: Option<Value>,
}

impl Engine {
    /// Submit a tag. The submitter's current trust level decides whether it
    /// starts pending or is approved straight away.
    pub async fn submit_tag(&self, new_tag: NewTag, submitter_id: &str) -> Result<Tag> {
        let (display_name, normalized_name) = validate_entity_name(&new_tag.entity_name)?;
        let valid = ValidTag {
            content_id: validate_content_id(&new_tag.content_id)?,
            display_name,
            normalized_name,
            attrs: validate_attrs(new_tag.attrs)?,
        };

        let _guard = self.locks.lock(submitter_id).await;
        let (tag, events) = retry_on_lock("tag submit", self.settings.max_lock_wait_ms, || {
            self.submit_tag_once(&valid, submitter_id)
        })
        .await?;
        self.publish(events);

        info!(
            tag_id = %tag.id,
            content_id = %tag.content_id,
            submitter_id,
            status = %tag.status,
            "Tag submitted"
        );
        Ok(tag)
    }

    async fn submit_tag_once(
        &self,
        valid: &ValidTag,
        submitter_id: &str,
    ) -> Result<(Tag, Vec<TagTrustEvent>)> {
        let mut tx = self.db.begin().await?;

        if let Some(existing) = db::tags::find_open_duplicate(
            &mut tx,
            &valid.content_id,
            &valid.normalized_name,
            submitter_id,
        )
        .await?
        {
            return Err(Error::Duplicate(format!(
                "Tag {} already covers this content and name",
                existing
            )));
        }

        let auto_approve = db::reputation::get_record(&mut tx, submitter_id)
            .await?
            .map(|record| record.auto_approve)
            .unwrap_or(false);

        let entity = match db::entities::get_by_normalized(&mut tx, &valid.normalized_name).await? {
            Some(entity) => EntityRef::Resolved {
                entity_id: entity.id,
                canonical_name: entity.canonical_name,
            },
            None => EntityRef::Unresolved {
                name: valid.display_name.clone(),
            },
        };

        let now = Utc::now();
        let mut tag = Tag {
            id: Uuid::new_v4(),
            content_id: valid.content_id.clone(),
            entity_name: valid.display_name.clone(),
            normalized_name: valid.normalized_name.clone(),
            attrs: valid.attrs.clone(),
            submitter_id: submitter_id.to_string(),
            status: if auto_approve {
                TagStatus::Approved
            } else {
                TagStatus::Pending
            },
            upvotes: 0,
            downvotes: 0,
            confidence: scoring::confidence(0, 0),
            entity,
            decided_by: auto_approve.then(|| AUTO_APPROVAL_ACTOR.to_string()),
            decided_at: auto_approve.then_some(now),
            rejection_reason: None,
            created_at: now,
        };

        if let Err(e) = db::tags::insert_tag(&mut tx, &tag).await {
            // Lost a race against an identical submission
            if e.is_unique_violation() {
                return Err(Error::Duplicate(
                    "An open tag already covers this content and name".to_string(),
                ));
            }
            return Err(e);
        }

        let mut events = vec![TagTrustEvent::TagSubmitted {
            tag_id: tag.id,
            content_id: tag.content_id.clone(),
            submitter_id: submitter_id.to_string(),
            status: tag.status,
            timestamp: now,
        }];

        let metadata = json!({
            "tag_id": tag.id,
            "content_id": tag.content_id,
            "entity_name": tag.entity_name,
        });
        record_transition(
            &mut tx,
            submitter_id,
            ReputationEventType::TagSubmitted,
            metadata,
            now,
            &mut events,
        )
        .await?;

        if auto_approve {
            let metadata = json!({ "tag_id": tag.id, "decided_by": AUTO_APPROVAL_ACTOR });
            record_transition(
                &mut tx,
                submitter_id,
                ReputationEventType::TagApproved,
                metadata,
                now,
                &mut events,
            )
            .await?;
            events.push(TagTrustEvent::TagDecided {
                tag_id: tag.id,
                status: TagStatus::Approved,
                decided_by: AUTO_APPROVAL_ACTOR.to_string(),
                timestamp: now,
            });
            if promote_if_agreed(&mut tx, &tag.normalized_name, now, &mut events)
                .await?
                .is_some()
            {
                tag = db::tags::require_tag(&mut tx, tag.id).await?;
            }
        }

        tx.commit().await?;
        Ok((tag, events))
    }

    /// Withdraw one of the requester's own pending tags.
    ///
    /// The tag and its votes are deleted; a `tag_withdrawn` event reverses
    /// the pending count and any votes the submitter had received on it.
    pub async fn withdraw_tag(&self, tag_id: Uuid, requester_id: &str) -> Result<Withdrawal> {
        let tag = {
            let mut conn = self.db.acquire().await?;
            db::tags::require_tag(&mut conn, tag_id).await?
        };
        check_withdrawable(&tag, requester_id)?;

        let _guard = self.locks.lock(&tag.submitter_id).await;
        let (withdrawal, events) =
            retry_on_lock("tag withdraw", self.settings.max_lock_wait_ms, || {
                self.withdraw_tag_once(tag_id, requester_id)
            })
            .await?;
        self.publish(events);

        info!(%tag_id, requester_id, "Tag withdrawn");
        Ok(withdrawal)
    }

    async fn withdraw_tag_once(
        &self,
        tag_id: Uuid,
        requester_id: &str,
    ) -> Result<(Withdrawal, Vec<TagTrustEvent>)> {
        let mut tx = self.db.begin().await?;
        let tag = db::tags::require_tag(&mut tx, tag_id).await?;
        check_withdrawable(&tag, requester_id)?;

        let (upvotes, downvotes) = db::votes::count_votes(&mut tx, tag_id).await?;
        if !db::tags::delete_pending(&mut tx, tag_id).await? {
            return Err(Error::Conflict(format!("Tag {} changed during withdrawal", tag_id)));
        }

        let now = Utc::now();
        let mut events = vec![TagTrustEvent::TagDecided {
            tag_id,
            status: TagStatus::Withdrawn,
            decided_by: requester_id.to_string(),
            timestamp: now,
        }];
        let metadata = json!({
            "tag_id": tag_id,
            "entity_name": tag.entity_name,
            "upvotes_removed": upvotes,
            "downvotes_removed": downvotes,
        });
        record_transition(
            &mut tx,
            &tag.submitter_id,
            ReputationEventType::TagWithdrawn,
            metadata,
            now,
            &mut events,
        )
        .await?;

        tx.commit().await?;
        Ok((
            Withdrawal {
                tag_id,
                upvotes_removed: upvotes,
                downvotes_removed: downvotes,
            },
            events,
        ))
    }

    /// Tags on a content item, oldest first.
    ///
    /// Everyone sees approved tags. A signed-in user also sees their own
    /// pending tags; admins see every status.
    pub async fn list_tags_for_content(
        &self,
        content_id: &str,
        viewer: Viewer<'_>,
    ) -> Result<Vec<Tag>> {
        let content_id = validate_content_id(content_id)?;
        let (own, include_all) = match viewer {
            Viewer::Anonymous => (None, false),
            Viewer::User(user_id) => (Some(user_id), false),
            Viewer::Admin => (None, true),
        };

        let mut conn = self.db.acquire().await?;
        let tags = db::tags::list_for_content(&mut conn, &content_id, own, include_all).await?;
        debug!(%content_id, count = tags.len(), "Listed tags");
        Ok(tags)
    }

    pub async fn get_tag(&self, tag_id: Uuid) -> Result<Tag> {
        let mut conn = self.db.acquire().await?;
        db::tags::require_tag(&mut conn, tag_id).await
    }
}

fn check_withdrawable(tag: &Tag, requester_id: &str) -> Result<()> {
    if tag.submitter_id != requester_id {
        return Err(Error::NotOwner(format!(
            "Tag {} was submitted by another user",
            tag.id
        )));
    }
    if !tag.status.can_transition_to(TagStatus::Withdrawn) {
        return Err(Error::AlreadyDecided(format!(
            "Tag {} is {} and can no longer be withdrawn",
            tag.id, tag.status
        )));
    }
    Ok(())
}
