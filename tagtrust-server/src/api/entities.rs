//! Entity directory lookup

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::engine::EntityLookup;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub q: String,
}

/// GET /entities?q=jane%20doe
pub async fn lookup_entities(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> ApiResult<Json<EntityLookup>> {
    let lookup = state.engine.lookup_entities(&query.q).await?;
    Ok(Json(lookup))
}
