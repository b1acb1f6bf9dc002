//! Entity directory queries

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tagtrust_common::{Entity, Result};

use super::parse_uuid;

fn entity_from_row(row: &SqliteRow) -> Result<Entity> {
    let id: String = row.try_get("id")?;
    Ok(Entity {
        id: parse_uuid(&id)?,
        canonical_name: row.try_get("canonical_name")?,
        normalized_name: row.try_get("normalized_name")?,
        supporting_submitters: row.try_get("supporting_submitters")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn get_by_normalized(
    conn: &mut SqliteConnection,
    normalized_name: &str,
) -> Result<Option<Entity>> {
    let row = sqlx::query(
        r#"
        SELECT id, canonical_name, normalized_name, supporting_submitters, created_at
        FROM entities
        WHERE normalized_name = ?
        "#,
    )
    .bind(normalized_name)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(entity_from_row).transpose()
}

pub async fn insert_entity(conn: &mut SqliteConnection, entity: &Entity) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO entities (id, canonical_name, normalized_name, supporting_submitters, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(entity.id.to_string())
    .bind(&entity.canonical_name)
    .bind(&entity.normalized_name)
    .bind(entity.supporting_submitters)
    .bind(entity.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn list_entities(conn: &mut SqliteConnection) -> Result<Vec<Entity>> {
    let rows = sqlx::query(
        r#"
        SELECT id, canonical_name, normalized_name, supporting_submitters, created_at
        FROM entities
        ORDER BY canonical_name
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(entity_from_row).collect()
}

/// Distinct submitters with an approved tag under `normalized_name`, and the
/// display name of the earliest such tag
pub async fn approved_support(
    conn: &mut SqliteConnection,
    normalized_name: &str,
) -> Result<(i64, Option<String>)> {
    let submitters: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(DISTINCT submitter_id) FROM tags
        WHERE normalized_name = ? AND status = 'approved'
        "#,
    )
    .bind(normalized_name)
    .fetch_one(&mut *conn)
    .await?;

    let earliest: Option<String> = sqlx::query_scalar(
        r#"
        SELECT entity_name FROM tags
        WHERE normalized_name = ? AND status = 'approved'
        ORDER BY created_at ASC, id ASC
        LIMIT 1
        "#,
    )
    .bind(normalized_name)
    .fetch_optional(&mut *conn)
    .await?;

    Ok((submitters, earliest))
}
