//! Vote queries

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};
use tagtrust_common::{Result, Vote, VoteDirection};
use uuid::Uuid;

/// The voter's current vote on a tag, if they have voted
pub async fn get_vote(
    conn: &mut SqliteConnection,
    tag_id: Uuid,
    voter_id: &str,
) -> Result<Option<Vote>> {
    let row = sqlx::query(
        r#"
        SELECT direction, created_at, updated_at
        FROM votes
        WHERE tag_id = ? AND voter_id = ?
        "#,
    )
    .bind(tag_id.to_string())
    .bind(voter_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let direction: String = row.try_get("direction")?;
    Ok(Some(Vote {
        tag_id,
        voter_id: voter_id.to_string(),
        direction: direction.parse::<VoteDirection>()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

/// Record a vote; a second vote by the same voter replaces the first
pub async fn upsert_vote(
    conn: &mut SqliteConnection,
    tag_id: Uuid,
    voter_id: &str,
    direction: VoteDirection,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO votes (tag_id, voter_id, direction, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (tag_id, voter_id)
        DO UPDATE SET direction = excluded.direction, updated_at = excluded.updated_at
        "#,
    )
    .bind(tag_id.to_string())
    .bind(voter_id)
    .bind(direction.as_str())
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// (upvotes, downvotes) counted from the votes table
pub async fn count_votes(conn: &mut SqliteConnection, tag_id: Uuid) -> Result<(i64, i64)> {
    let (up, down): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(CASE WHEN direction = 'up' THEN 1 ELSE 0 END), 0),
               COALESCE(SUM(CASE WHEN direction = 'down' THEN 1 ELSE 0 END), 0)
        FROM votes
        WHERE tag_id = ?
        "#,
    )
    .bind(tag_id.to_string())
    .fetch_one(&mut *conn)
    .await?;

    Ok((up, down))
}
