//! Reputation ledger: folding events into records inside a unit of work

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::SqliteConnection;
use tagtrust_common::db::retry_on_lock;
use tagtrust_common::events::TagTrustEvent;
use tagtrust_common::ledger;
use tagtrust_common::{
    Error, ReputationEvent, ReputationEventType, ReputationRecord, Result, TrustLevel,
};
use tracing::info;

use super::Engine;
use crate::db;

/// A user's current record with the history it was folded from
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationView {
    pub record: ReputationRecord,
    pub events: Vec<ReputationEvent>,
}

/// Apply one reputation event for `user_id` on `conn` and append it to the log.
///
/// Must run inside the caller's transaction while the caller holds the
/// user's lock. The matching live event is pushed onto `events`.
pub(crate) async fn record_transition(
    conn: &mut SqliteConnection,
    user_id: &str,
    event_type: ReputationEventType,
    metadata: Value,
    now: DateTime<Utc>,
    events: &mut Vec<TagTrustEvent>,
) -> Result<ReputationRecord> {
    let before = db::reputation::get_record(conn, user_id)
        .await?
        .unwrap_or_else(|| ReputationRecord::new(user_id));

    let mut after = before.clone();
    ledger::apply_event(&mut after, event_type, &metadata)?;

    db::reputation::upsert_record(conn, &after, now).await?;
    db::reputation::append_event(conn, user_id, event_type, &before, &after, metadata, now)
        .await?;

    let changed = TagTrustEvent::ReputationChanged {
        user_id: user_id.to_string(),
        event_type,
        score_before: before.reputation_score,
        score_after: after.reputation_score,
        trust_before: before.trust_level,
        trust_after: after.trust_level,
        timestamp: now,
    };
    if changed.crosses_trust_threshold() {
        info!(
            user_id,
            from = %before.trust_level,
            to = %after.trust_level,
            score = after.reputation_score,
            "Trust level changed"
        );
    }
    events.push(changed);

    Ok(after)
}

impl Engine {
    /// Current record and full history for a user.
    ///
    /// A user with no history gets the initial record.
    pub async fn reputation_of(&self, user_id: &str) -> Result<ReputationView> {
        let mut tx = self.db.begin().await?;
        let record = db::reputation::get_record(&mut tx, user_id)
            .await?
            .unwrap_or_else(|| ReputationRecord::new(user_id));
        let events = db::reputation::list_events(&mut tx, user_id).await?;
        tx.commit().await?;

        Ok(ReputationView { record, events })
    }

    /// Pin (or, with `None`, release) a user's trust level.
    ///
    /// Setting the level already in force, or clearing when nothing is
    /// pinned, appends nothing.
    pub async fn set_trust_override(
        &self,
        user_id: &str,
        level: Option<TrustLevel>,
        admin_id: &str,
    ) -> Result<ReputationRecord> {
        if user_id.trim().is_empty() {
            return Err(Error::Validation("user id must not be empty".to_string()));
        }

        let _guard = self.locks.lock(user_id).await;
        let (record, events) = retry_on_lock("trust override", self.settings.max_lock_wait_ms, || {
            self.set_trust_override_once(user_id, level, admin_id)
        })
        .await?;
        self.publish(events);

        Ok(record)
    }

    async fn set_trust_override_once(
        &self,
        user_id: &str,
        level: Option<TrustLevel>,
        admin_id: &str,
    ) -> Result<(ReputationRecord, Vec<TagTrustEvent>)> {
        let mut tx = self.db.begin().await?;
        let current = db::reputation::get_record(&mut tx, user_id).await?;
        let current_override = current.as_ref().and_then(|r| r.trust_override);

        if current_override == level {
            tx.commit().await?;
            let record = current.unwrap_or_else(|| ReputationRecord::new(user_id));
            return Ok((record, Vec::new()));
        }

        let now = Utc::now();
        let mut events = Vec::new();
        let (event_type, metadata) = match level {
            Some(level) => (
                ReputationEventType::TrustOverrideSet,
                json!({ "level": level.as_str(), "set_by": admin_id }),
            ),
            None => (
                ReputationEventType::TrustOverrideCleared,
                json!({ "cleared_by": admin_id }),
            ),
        };
        let record =
            record_transition(&mut tx, user_id, event_type, metadata, now, &mut events).await?;
        tx.commit().await?;

        info!(user_id, admin_id, level = ?level, "Trust override updated");
        Ok((record, events))
    }
}
