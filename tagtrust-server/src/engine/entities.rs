//! Entity directory: promotion of agreed names and lookup

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tagtrust_common::events::TagTrustEvent;
use tagtrust_common::normalize::{name_similarity, normalize_entity_name, SUGGESTION_THRESHOLD};
use tagtrust_common::{Entity, Error, Result};
use tracing::info;
use uuid::Uuid;

use super::Engine;
use crate::db;

/// Distinct approving submitters needed before a name becomes an entity
pub const PROMOTION_THRESHOLD: i64 = 2;

/// Suggestions returned per lookup
const MAX_SUGGESTIONS: usize = 10;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySuggestion {
    #[serde(flatten)]
    pub entity: Entity,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityLookup {
    pub query: String,
    pub exact: Option<Entity>,
    pub suggestions: Vec<EntitySuggestion>,
}

/// Called after a tag under `normalized_name` becomes approved.
///
/// Links tags to an existing entity, or creates the entity once enough
/// distinct submitters agree.
pub(crate) async fn promote_if_agreed(
    conn: &mut SqliteConnection,
    normalized_name: &str,
    now: DateTime<Utc>,
    events: &mut Vec<TagTrustEvent>,
) -> Result<Option<Entity>> {
    if let Some(existing) = db::entities::get_by_normalized(conn, normalized_name).await? {
        db::tags::link_entity(conn, normalized_name, existing.id).await?;
        return Ok(None);
    }

    let (submitters, earliest_name) =
        db::entities::approved_support(conn, normalized_name).await?;
    let canonical_name = match earliest_name {
        Some(name) if submitters >= PROMOTION_THRESHOLD => name,
        _ => return Ok(None),
    };

    let entity = Entity {
        id: Uuid::new_v4(),
        canonical_name,
        normalized_name: normalized_name.to_string(),
        supporting_submitters: submitters,
        created_at: now,
    };
    db::entities::insert_entity(conn, &entity).await?;
    let linked = db::tags::link_entity(conn, normalized_name, entity.id).await?;

    info!(
        entity_id = %entity.id,
        canonical_name = %entity.canonical_name,
        submitters,
        linked,
        "Promoted entity"
    );
    events.push(TagTrustEvent::EntityPromoted {
        entity_id: entity.id,
        canonical_name: entity.canonical_name.clone(),
        timestamp: now,
    });

    Ok(Some(entity))
}

impl Engine {
    /// Exact match on the normalized query plus close matches by
    /// Jaro-Winkler similarity, best first
    pub async fn lookup_entities(&self, query: &str) -> Result<EntityLookup> {
        let normalized = normalize_entity_name(query);
        if normalized.is_empty() {
            return Err(Error::Validation("query must not be empty".to_string()));
        }

        let mut conn = self.db.acquire().await?;
        let exact = db::entities::get_by_normalized(&mut conn, &normalized).await?;

        let mut suggestions: Vec<EntitySuggestion> = db::entities::list_entities(&mut conn)
            .await?
            .into_iter()
            .filter(|entity| entity.normalized_name != normalized)
            .filter_map(|entity| {
                let similarity = name_similarity(&normalized, &entity.normalized_name);
                (similarity >= SUGGESTION_THRESHOLD).then_some(EntitySuggestion { entity, similarity })
            })
            .collect();
        suggestions.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        suggestions.truncate(MAX_SUGGESTIONS);

        Ok(EntityLookup {
            query: query.to_string(),
            exact,
            suggestions,
        })
    }
}
