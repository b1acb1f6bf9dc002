//! Reconciliation: replay the event log against the live projections
//!
//! Reputation records are recomputed from each user's events and tag vote
//! totals are recounted from the votes table. Drift is always logged; with
//! `repair` the projections are rewritten from their sources.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tagtrust_common::db::retry_on_lock;
use tagtrust_common::events::TagTrustEvent;
use tagtrust_common::{ledger, scoring, ReputationRecord, Result};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::Engine;
use crate::db;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDrift {
    pub user_id: String,
    /// None when events exist but the record row is missing
    pub stored: Option<ReputationRecord>,
    /// None when the event log could not be folded
    pub replayed: Option<ReputationRecord>,
    /// Why the fold failed; such users are reported but never repaired
    pub replay_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDrift {
    pub tag_id: Uuid,
    pub stored_upvotes: i64,
    pub stored_downvotes: i64,
    pub counted_upvotes: i64,
    pub counted_downvotes: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub users_checked: usize,
    pub tags_checked: usize,
    pub drifted_users: Vec<UserDrift>,
    pub drifted_tags: Vec<TagDrift>,
    pub repaired: bool,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.drifted_users.is_empty() && self.drifted_tags.is_empty()
    }
}

impl Engine {
    /// Check every user's record against a replay of their events, and every
    /// tag's vote totals against its votes. With `repair`, rewrite whatever
    /// drifted.
    pub async fn reconcile(&self, repair: bool) -> Result<ReconcileReport> {
        let user_ids = {
            let mut conn = self.db.acquire().await?;
            db::reputation::list_user_ids(&mut conn).await?
        };

        let mut report = ReconcileReport {
            repaired: repair,
            ..Default::default()
        };

        for user_id in &user_ids {
            report.users_checked += 1;
            let drift = if repair {
                let _guard = self.locks.lock(user_id).await;
                retry_on_lock("reconcile user", self.settings.max_lock_wait_ms, || {
                    self.reconcile_user_once(user_id, true)
                })
                .await?
            } else {
                self.reconcile_user_once(user_id, false).await?
            };

            match drift {
                Some(drift) if drift.replay_error.is_some() => {
                    warn!(
                        user_id = %drift.user_id,
                        error = ?drift.replay_error,
                        "Event log could not be replayed"
                    );
                    report.drifted_users.push(drift);
                }
                Some(drift) => {
                    warn!(
                        user_id = %drift.user_id,
                        stored = ?drift.stored,
                        replayed = ?drift.replayed,
                        repaired = repair,
                        "Reputation record drifted from event log"
                    );
                    report.drifted_users.push(drift);
                }
                None => {}
            }
        }

        let (tags_checked, drifted_tags) =
            retry_on_lock("reconcile votes", self.settings.max_lock_wait_ms, || {
                self.reconcile_votes_once(repair)
            })
            .await?;
        report.tags_checked = tags_checked;
        for drift in &drifted_tags {
            warn!(
                tag_id = %drift.tag_id,
                stored_upvotes = drift.stored_upvotes,
                stored_downvotes = drift.stored_downvotes,
                counted_upvotes = drift.counted_upvotes,
                counted_downvotes = drift.counted_downvotes,
                repaired = repair,
                "Tag vote totals drifted from votes"
            );
        }
        report.drifted_tags = drifted_tags;

        info!(
            users_checked = report.users_checked,
            tags_checked = report.tags_checked,
            drifted_users = report.drifted_users.len(),
            drifted_tags = report.drifted_tags.len(),
            repaired = repair,
            "Reconciliation finished"
        );
        self.publish(vec![TagTrustEvent::ReconciliationCompleted {
            users_checked: report.users_checked,
            drifted_users: report.drifted_users.len(),
            drifted_tags: report.drifted_tags.len(),
            repaired: repair,
            timestamp: Utc::now(),
        }]);

        Ok(report)
    }

    /// Compare one user inside a single transaction so the record and the
    /// events come from the same snapshot
    async fn reconcile_user_once(&self, user_id: &str, repair: bool) -> Result<Option<UserDrift>> {
        let mut tx = self.db.begin().await?;
        let stored = db::reputation::get_record(&mut tx, user_id).await?;
        let events = db::reputation::list_events(&mut tx, user_id).await?;
        let replayed = match ledger::replay(user_id, &events) {
            Ok(replayed) => replayed,
            Err(e) => {
                tx.rollback().await?;
                return Ok(Some(UserDrift {
                    user_id: user_id.to_string(),
                    stored,
                    replayed: None,
                    replay_error: Some(e.to_string()),
                }));
            }
        };

        if stored.as_ref() == Some(&replayed) {
            tx.commit().await?;
            return Ok(None);
        }

        if repair {
            db::reputation::upsert_record(&mut tx, &replayed, Utc::now()).await?;
        }
        tx.commit().await?;

        Ok(Some(UserDrift {
            user_id: user_id.to_string(),
            stored,
            replayed: Some(replayed),
            replay_error: None,
        }))
    }

    async fn reconcile_votes_once(&self, repair: bool) -> Result<(usize, Vec<TagDrift>)> {
        let mut tx = self.db.begin().await?;
        let tallies = db::tags::vote_tallies(&mut tx).await?;
        let mut drifted = Vec::new();

        for tally in &tallies {
            let expected_confidence =
                scoring::confidence(tally.counted_upvotes, tally.counted_downvotes);
            let matches = tally.stored_upvotes == tally.counted_upvotes
                && tally.stored_downvotes == tally.counted_downvotes
                && tally.stored_confidence == expected_confidence;
            if matches {
                continue;
            }

            if repair {
                db::tags::update_vote_totals(
                    &mut tx,
                    tally.tag_id,
                    tally.counted_upvotes,
                    tally.counted_downvotes,
                    expected_confidence,
                )
                .await?;
            }
            drifted.push(TagDrift {
                tag_id: tally.tag_id,
                stored_upvotes: tally.stored_upvotes,
                stored_downvotes: tally.stored_downvotes,
                counted_upvotes: tally.counted_upvotes,
                counted_downvotes: tally.counted_downvotes,
            });
        }

        tx.commit().await?;
        Ok((tallies.len(), drifted))
    }
}

/// Run `reconcile` every `interval_secs` seconds until the task is aborted.
///
/// The first pass happens one interval after startup.
pub fn spawn_reconciliation_job(engine: Engine, interval_secs: u64, repair: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(interval_secs.max(1));
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = engine.reconcile(repair).await {
                error!(error = %e, "Scheduled reconciliation failed");
            }
        }
    })
}
