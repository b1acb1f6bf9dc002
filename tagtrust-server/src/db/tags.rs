//! Tag queries

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tagtrust_common::{EntityRef, Error, Result, Tag, TagStatus};
use uuid::Uuid;

use super::parse_uuid;

const TAG_SELECT: &str = r#"
    SELECT t.id, t.content_id, t.entity_name, t.normalized_name, t.attrs, t.submitter_id,
           t.status, t.upvotes, t.downvotes, t.confidence, t.entity_id, e.canonical_name,
           t.decided_by, t.decided_at, t.rejection_reason, t.created_at
    FROM tags t
    LEFT JOIN entities e ON e.id = t.entity_id
"#;

fn tag_from_row(row: &SqliteRow) -> Result<Tag> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let attrs: Option<String> = row.try_get("attrs")?;
    let entity_name: String = row.try_get("entity_name")?;
    let entity_id: Option<String> = row.try_get("entity_id")?;
    let canonical_name: Option<String> = row.try_get("canonical_name")?;

    let entity = match (entity_id, canonical_name) {
        (Some(entity_id), Some(canonical_name)) => EntityRef::Resolved {
            entity_id: parse_uuid(&entity_id)?,
            canonical_name,
        },
        _ => EntityRef::Unresolved {
            name: entity_name.clone(),
        },
    };

    Ok(Tag {
        id: parse_uuid(&id)?,
        content_id: row.try_get("content_id")?,
        entity_name,
        normalized_name: row.try_get("normalized_name")?,
        attrs: attrs.map(|s| serde_json::from_str(&s)).transpose()?,
        submitter_id: row.try_get("submitter_id")?,
        status: status.parse()?,
        upvotes: row.try_get("upvotes")?,
        downvotes: row.try_get("downvotes")?,
        confidence: row.try_get("confidence")?,
        entity,
        decided_by: row.try_get("decided_by")?,
        decided_at: row.try_get("decided_at")?,
        rejection_reason: row.try_get("rejection_reason")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Insert a new tag row. Entity resolution is taken from `tag.entity`.
pub async fn insert_tag(conn: &mut SqliteConnection, tag: &Tag) -> Result<()> {
    let entity_id = match &tag.entity {
        EntityRef::Resolved { entity_id, .. } => Some(entity_id.to_string()),
        EntityRef::Unresolved { .. } => None,
    };
    let attrs = tag.attrs.as_ref().map(|a| a.to_string());

    sqlx::query(
        r#"
        INSERT INTO tags (
            id, content_id, entity_name, normalized_name, attrs, submitter_id, status,
            upvotes, downvotes, confidence, entity_id, decided_by, decided_at,
            rejection_reason, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(tag.id.to_string())
    .bind(&tag.content_id)
    .bind(&tag.entity_name)
    .bind(&tag.normalized_name)
    .bind(attrs)
    .bind(&tag.submitter_id)
    .bind(tag.status.as_str())
    .bind(tag.upvotes)
    .bind(tag.downvotes)
    .bind(tag.confidence)
    .bind(entity_id)
    .bind(&tag.decided_by)
    .bind(tag.decided_at)
    .bind(&tag.rejection_reason)
    .bind(tag.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn get_tag(conn: &mut SqliteConnection, tag_id: Uuid) -> Result<Option<Tag>> {
    let query = format!("{} WHERE t.id = ?", TAG_SELECT);
    let row = sqlx::query(&query)
        .bind(tag_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(tag_from_row).transpose()
}

/// Fetch a tag or fail with `NotFound`
pub async fn require_tag(conn: &mut SqliteConnection, tag_id: Uuid) -> Result<Tag> {
    get_tag(conn, tag_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Tag {} not found", tag_id)))
}

/// Id of the open (pending or approved) tag for this triple, if any
pub async fn find_open_duplicate(
    conn: &mut SqliteConnection,
    content_id: &str,
    normalized_name: &str,
    submitter_id: &str,
) -> Result<Option<Uuid>> {
    let id: Option<String> = sqlx::query_scalar(
        r#"
        SELECT id FROM tags
        WHERE content_id = ? AND normalized_name = ? AND submitter_id = ?
          AND status IN ('pending', 'approved')
        "#,
    )
    .bind(content_id)
    .bind(normalized_name)
    .bind(submitter_id)
    .fetch_optional(&mut *conn)
    .await?;

    id.as_deref().map(parse_uuid).transpose()
}

/// Tags on a content item, oldest first.
///
/// Approved tags are always included. Pending tags are included when
/// `include_pending_of` names their submitter; every status is included when
/// `include_all` is set.
pub async fn list_for_content(
    conn: &mut SqliteConnection,
    content_id: &str,
    include_pending_of: Option<&str>,
    include_all: bool,
) -> Result<Vec<Tag>> {
    let query = format!(
        r#"{}
        WHERE t.content_id = ?
          AND (t.status = 'approved' OR ? OR (t.status = 'pending' AND t.submitter_id = ?))
        ORDER BY t.created_at ASC, t.id ASC
        "#,
        TAG_SELECT
    );
    let rows = sqlx::query(&query)
        .bind(content_id)
        .bind(include_all)
        .bind(include_pending_of)
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(tag_from_row).collect()
}

/// Move a pending tag to a decided status.
///
/// Returns false if the tag was no longer pending; the caller lost a race.
pub async fn set_decision(
    conn: &mut SqliteConnection,
    tag_id: Uuid,
    status: TagStatus,
    decided_by: &str,
    rejection_reason: Option<&str>,
    decided_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE tags
        SET status = ?, decided_by = ?, decided_at = ?, rejection_reason = ?
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(status.as_str())
    .bind(decided_by)
    .bind(decided_at)
    .bind(rejection_reason)
    .bind(tag_id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Hard-delete a pending tag; its votes go with it (ON DELETE CASCADE).
///
/// Returns false if the tag was no longer pending.
pub async fn delete_pending(conn: &mut SqliteConnection, tag_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tags WHERE id = ? AND status = 'pending'")
        .bind(tag_id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Store recounted vote totals and the confidence derived from them
pub async fn update_vote_totals(
    conn: &mut SqliteConnection,
    tag_id: Uuid,
    upvotes: i64,
    downvotes: i64,
    confidence: f64,
) -> Result<()> {
    sqlx::query("UPDATE tags SET upvotes = ?, downvotes = ?, confidence = ? WHERE id = ?")
        .bind(upvotes)
        .bind(downvotes)
        .bind(confidence)
        .bind(tag_id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(())
}

pub async fn count_by_status(conn: &mut SqliteConnection, status: TagStatus) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tags WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(&mut *conn)
        .await?;

    Ok(count)
}

/// One page of tags in a status.
///
/// Pending tags come lowest confidence first, then oldest first, then by id.
/// Decided tags come most recently decided first.
pub async fn list_by_status(
    conn: &mut SqliteConnection,
    status: TagStatus,
    limit: i64,
    offset: i64,
) -> Result<Vec<Tag>> {
    let order = match status {
        TagStatus::Pending => "t.confidence ASC, t.created_at ASC, t.id ASC",
        _ => "t.decided_at DESC, t.id ASC",
    };
    let query = format!(
        "{} WHERE t.status = ? ORDER BY {} LIMIT ? OFFSET ?",
        TAG_SELECT, order
    );
    let rows = sqlx::query(&query)
        .bind(status.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(tag_from_row).collect()
}

/// Resolve every unresolved tag carrying `normalized_name` to an entity
pub async fn link_entity(
    conn: &mut SqliteConnection,
    normalized_name: &str,
    entity_id: Uuid,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tags SET entity_id = ? WHERE normalized_name = ? AND entity_id IS NULL",
    )
    .bind(entity_id.to_string())
    .bind(normalized_name)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Stored vote totals next to the totals recounted from the votes table
#[derive(Debug, Clone, PartialEq)]
pub struct VoteTally {
    pub tag_id: Uuid,
    pub stored_upvotes: i64,
    pub stored_downvotes: i64,
    pub stored_confidence: f64,
    pub counted_upvotes: i64,
    pub counted_downvotes: i64,
}

pub async fn vote_tallies(conn: &mut SqliteConnection) -> Result<Vec<VoteTally>> {
    let rows = sqlx::query(
        r#"
        SELECT t.id, t.upvotes, t.downvotes, t.confidence,
               COALESCE(SUM(CASE WHEN v.direction = 'up' THEN 1 ELSE 0 END), 0) AS counted_up,
               COALESCE(SUM(CASE WHEN v.direction = 'down' THEN 1 ELSE 0 END), 0) AS counted_down
        FROM tags t
        LEFT JOIN votes v ON v.tag_id = t.id
        GROUP BY t.id
        ORDER BY t.id
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.try_get("id")?;
            Ok(VoteTally {
                tag_id: parse_uuid(&id)?,
                stored_upvotes: row.try_get("upvotes")?,
                stored_downvotes: row.try_get("downvotes")?,
                stored_confidence: row.try_get("confidence")?,
                counted_upvotes: row.try_get("counted_up")?,
                counted_downvotes: row.try_get("counted_down")?,
            })
        })
        .collect()
}
