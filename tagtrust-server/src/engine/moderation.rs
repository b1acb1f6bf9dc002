//! Moderation queue and admin decisions

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tagtrust_common::db::retry_on_lock;
use tagtrust_common::events::TagTrustEvent;
use tagtrust_common::{Error, ReputationEventType, Result, Tag, TagStatus};
use tracing::{info, warn};
use uuid::Uuid;

use super::entities::promote_if_agreed;
use super::reputation::record_transition;
use super::{Engine, MAX_BATCH_SIZE};
use crate::db;
use crate::pagination::{calculate_pagination, Pagination};

/// Rejection reasons are cut to this many characters
const MAX_REASON_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    #[serde(flatten)]
    pub tag: Tag,
    /// 1 - confidence; higher means review sooner
    pub priority: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePage {
    pub status: TagStatus,
    pub pagination: Pagination,
    pub tags: Vec<QueueEntry>,
}

/// Per-tag result of a batch approval
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub tag_id: Uuid,
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub approved: usize,
    pub failed: usize,
    pub results: Vec<BatchItem>,
}

impl Engine {
    /// One page of tags in `status`.
    ///
    /// The pending queue is ordered lowest confidence first, ties broken by
    /// age and then id. Decided tags are listed newest decision first.
    pub async fn list_queue(&self, status: TagStatus, page: i64) -> Result<QueuePage> {
        if status == TagStatus::Withdrawn {
            return Err(Error::Validation(
                "withdrawn tags are deleted and cannot be listed".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;
        let total = db::tags::count_by_status(&mut tx, status).await?;
        let pagination = calculate_pagination(total, page, self.settings.page_size);
        let tags = db::tags::list_by_status(&mut tx, status, pagination.page_size, pagination.offset)
            .await?;
        tx.commit().await?;

        Ok(QueuePage {
            status,
            pagination,
            tags: tags
                .into_iter()
                .map(|tag| QueueEntry {
                    priority: 1.0 - tag.confidence,
                    tag,
                })
                .collect(),
        })
    }

    pub async fn approve_tag(&self, tag_id: Uuid, admin_id: &str) -> Result<Tag> {
        self.decide(tag_id, admin_id, TagStatus::Approved, None).await
    }

    pub async fn reject_tag(
        &self,
        tag_id: Uuid,
        admin_id: &str,
        reason: Option<String>,
    ) -> Result<Tag> {
        let reason = reason
            .map(|r| r.trim().chars().take(MAX_REASON_CHARS).collect::<String>())
            .filter(|r| !r.is_empty());
        self.decide(tag_id, admin_id, TagStatus::Rejected, reason).await
    }

    /// Approve each tag independently; one failure does not stop the rest
    pub async fn batch_approve(&self, tag_ids: &[Uuid], admin_id: &str) -> Result<BatchOutcome> {
        if tag_ids.is_empty() {
            return Err(Error::Validation("tagIds must not be empty".to_string()));
        }
        if tag_ids.len() > MAX_BATCH_SIZE {
            return Err(Error::Validation(format!(
                "at most {} tags per batch, got {}",
                MAX_BATCH_SIZE,
                tag_ids.len()
            )));
        }

        let mut results = Vec::with_capacity(tag_ids.len());
        for &tag_id in tag_ids {
            let item = match self.approve_tag(tag_id, admin_id).await {
                Ok(_) => BatchItem {
                    tag_id,
                    approved: true,
                    error: None,
                },
                Err(e) => {
                    warn!(%tag_id, error = %e, "Batch approval skipped tag");
                    BatchItem {
                        tag_id,
                        approved: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            results.push(item);
        }

        let approved = results.iter().filter(|r| r.approved).count();
        info!(admin_id, approved, requested = tag_ids.len(), "Batch approval finished");
        Ok(BatchOutcome {
            approved,
            failed: results.len() - approved,
            results,
        })
    }

    async fn decide(
        &self,
        tag_id: Uuid,
        admin_id: &str,
        status: TagStatus,
        reason: Option<String>,
    ) -> Result<Tag> {
        let tag = {
            let mut conn = self.db.acquire().await?;
            db::tags::require_tag(&mut conn, tag_id).await?
        };
        if !tag.status.can_transition_to(status) {
            return Err(already_decided(&tag));
        }

        let _guard = self.locks.lock(&tag.submitter_id).await;
        let (decided, events) = retry_on_lock("tag decision", self.settings.max_lock_wait_ms, || {
            self.decide_once(tag_id, admin_id, status, reason.as_deref())
        })
        .await?;
        self.publish(events);

        info!(%tag_id, admin_id, status = %status, "Tag decided");
        Ok(decided)
    }

    async fn decide_once(
        &self,
        tag_id: Uuid,
        admin_id: &str,
        status: TagStatus,
        reason: Option<&str>,
    ) -> Result<(Tag, Vec<TagTrustEvent>)> {
        let mut tx = self.db.begin().await?;
        let tag = db::tags::require_tag(&mut tx, tag_id).await?;
        if !tag.status.can_transition_to(status) {
            return Err(already_decided(&tag));
        }

        let now = Utc::now();
        if !db::tags::set_decision(&mut tx, tag_id, status, admin_id, reason, now).await? {
            return Err(Error::Conflict(format!(
                "Tag {} was decided concurrently",
                tag_id
            )));
        }

        let mut events = vec![TagTrustEvent::TagDecided {
            tag_id,
            status,
            decided_by: admin_id.to_string(),
            timestamp: now,
        }];
        let (event_type, metadata) = match status {
            TagStatus::Approved => (
                ReputationEventType::TagApproved,
                json!({ "tag_id": tag_id, "decided_by": admin_id }),
            ),
            _ => (
                ReputationEventType::TagRejected,
                json!({ "tag_id": tag_id, "decided_by": admin_id, "reason": reason }),
            ),
        };
        record_transition(
            &mut tx,
            &tag.submitter_id,
            event_type,
            metadata,
            now,
            &mut events,
        )
        .await?;

        if status == TagStatus::Approved {
            promote_if_agreed(&mut tx, &tag.normalized_name, now, &mut events).await?;
        }

        let decided = db::tags::require_tag(&mut tx, tag_id).await?;
        tx.commit().await?;
        Ok((decided, events))
    }
}

fn already_decided(tag: &Tag) -> Error {
    Error::AlreadyDecided(format!("Tag {} is already {}", tag.id, tag.status))
}
