//! Reputation record and event log queries

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tagtrust_common::{ReputationEvent, ReputationEventType, ReputationRecord, Result, TrustLevel};

fn record_from_row(row: &SqliteRow) -> Result<ReputationRecord> {
    let trust_level: String = row.try_get("trust_level")?;
    let trust_override: Option<String> = row.try_get("trust_override")?;

    Ok(ReputationRecord {
        user_id: row.try_get("user_id")?,
        approved_tags: row.try_get("approved_tags")?,
        rejected_tags: row.try_get("rejected_tags")?,
        pending_tags: row.try_get("pending_tags")?,
        upvotes_received: row.try_get("upvotes_received")?,
        downvotes_received: row.try_get("downvotes_received")?,
        reputation_score: row.try_get("reputation_score")?,
        trust_level: trust_level.parse()?,
        auto_approve: row.try_get("auto_approve")?,
        trust_override: trust_override
            .as_deref()
            .map(|level| level.parse::<TrustLevel>())
            .transpose()?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<ReputationEvent> {
    let event_type: String = row.try_get("event_type")?;
    let trust_before: String = row.try_get("trust_before")?;
    let trust_after: String = row.try_get("trust_after")?;
    let metadata: String = row.try_get("metadata")?;

    Ok(ReputationEvent {
        seq: row.try_get("seq")?,
        user_id: row.try_get("user_id")?,
        event_type: event_type.parse()?,
        score_before: row.try_get("score_before")?,
        score_after: row.try_get("score_after")?,
        trust_before: trust_before.parse()?,
        trust_after: trust_after.parse()?,
        metadata: serde_json::from_str(&metadata)?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn get_record(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Option<ReputationRecord>> {
    let row = sqlx::query(
        r#"
        SELECT user_id, approved_tags, rejected_tags, pending_tags, upvotes_received,
               downvotes_received, reputation_score, trust_level, auto_approve, trust_override
        FROM reputation_records
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(record_from_row).transpose()
}

/// Write the full record, creating it on first use
pub async fn upsert_record(
    conn: &mut SqliteConnection,
    record: &ReputationRecord,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO reputation_records (
            user_id, approved_tags, rejected_tags, pending_tags, upvotes_received,
            downvotes_received, reputation_score, trust_level, auto_approve, trust_override,
            updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (user_id) DO UPDATE SET
            approved_tags = excluded.approved_tags,
            rejected_tags = excluded.rejected_tags,
            pending_tags = excluded.pending_tags,
            upvotes_received = excluded.upvotes_received,
            downvotes_received = excluded.downvotes_received,
            reputation_score = excluded.reputation_score,
            trust_level = excluded.trust_level,
            auto_approve = excluded.auto_approve,
            trust_override = excluded.trust_override,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&record.user_id)
    .bind(record.approved_tags)
    .bind(record.rejected_tags)
    .bind(record.pending_tags)
    .bind(record.upvotes_received)
    .bind(record.downvotes_received)
    .bind(record.reputation_score)
    .bind(record.trust_level.as_str())
    .bind(record.auto_approve)
    .bind(record.trust_override.map(|level| level.as_str()))
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Append one event; the record row must already exist
#[allow(clippy::too_many_arguments)]
pub async fn append_event(
    conn: &mut SqliteConnection,
    user_id: &str,
    event_type: ReputationEventType,
    before: &ReputationRecord,
    after: &ReputationRecord,
    metadata: Value,
    now: DateTime<Utc>,
) -> Result<ReputationEvent> {
    let result = sqlx::query(
        r#"
        INSERT INTO reputation_events (
            user_id, event_type, score_before, score_after, trust_before, trust_after,
            metadata, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(event_type.as_str())
    .bind(before.reputation_score)
    .bind(after.reputation_score)
    .bind(before.trust_level.as_str())
    .bind(after.trust_level.as_str())
    .bind(metadata.to_string())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(ReputationEvent {
        seq: result.last_insert_rowid(),
        user_id: user_id.to_string(),
        event_type,
        score_before: before.reputation_score,
        score_after: after.reputation_score,
        trust_before: before.trust_level,
        trust_after: after.trust_level,
        metadata,
        created_at: now,
    })
}

/// A user's events in append order
pub async fn list_events(conn: &mut SqliteConnection, user_id: &str) -> Result<Vec<ReputationEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT seq, user_id, event_type, score_before, score_after, trust_before, trust_after,
               metadata, created_at
        FROM reputation_events
        WHERE user_id = ?
        ORDER BY seq ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(event_from_row).collect()
}

/// Every user with a record or any logged event
pub async fn list_user_ids(conn: &mut SqliteConnection) -> Result<Vec<String>> {
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT user_id FROM reputation_records
        UNION
        SELECT DISTINCT user_id FROM reputation_events
        ORDER BY user_id
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(ids)
}
