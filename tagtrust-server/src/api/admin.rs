//! Moderation endpoints; all routes here sit behind `require_admin`

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use tagtrust_common::{ReputationRecord, Tag, TagStatus, TrustLevel};
use uuid::Uuid;

use super::auth::Caller;
use crate::engine::{BatchOutcome, QueuePage, ReconcileReport, ReputationView};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    1
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchApproveRequest {
    pub tag_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct TrustOverrideRequest {
    /// `null` clears the override
    pub level: Option<TrustLevel>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileRequest {
    #[serde(default)]
    pub repair: bool,
}

/// GET /admin/tags?status=pending&page=1
pub async fn list_queue(
    State(state): State<AppState>,
    Query(query): Query<QueueQuery>,
) -> ApiResult<Json<QueuePage>> {
    let status = match query.status.as_deref() {
        None | Some("") => TagStatus::Pending,
        Some(raw) => raw
            .parse::<TagStatus>()
            .map_err(|_| ApiError::BadRequest(format!("unknown status '{}'", raw)))?,
    };
    let page = state.engine.list_queue(status, query.page).await?;
    Ok(Json(page))
}

/// POST /admin/tags/:id/approve
pub async fn approve_tag(
    State(state): State<AppState>,
    caller: Caller,
    Path(tag_id): Path<Uuid>,
) -> ApiResult<Json<Tag>> {
    let tag = state.engine.approve_tag(tag_id, &caller.user_id).await?;
    Ok(Json(tag))
}

/// POST /admin/tags/:id/reject
///
/// The body is optional; `{"reason": "..."}` records why.
pub async fn reject_tag(
    State(state): State<AppState>,
    caller: Caller,
    Path(tag_id): Path<Uuid>,
    body: Option<Json<RejectRequest>>,
) -> ApiResult<Json<Tag>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let tag = state
        .engine
        .reject_tag(tag_id, &caller.user_id, request.reason)
        .await?;
    Ok(Json(tag))
}

/// POST /admin/tags/batch-approve
pub async fn batch_approve(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<BatchApproveRequest>,
) -> ApiResult<Json<BatchOutcome>> {
    let outcome = state
        .engine
        .batch_approve(&request.tag_ids, &caller.user_id)
        .await?;
    Ok(Json(outcome))
}

/// GET /admin/users/:id/reputation
pub async fn user_reputation(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ReputationView>> {
    let view = state.engine.reputation_of(&user_id).await?;
    Ok(Json(view))
}

/// PUT /admin/users/:id/trust-override
pub async fn set_trust_override(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
    Json(request): Json<TrustOverrideRequest>,
) -> ApiResult<Json<ReputationRecord>> {
    let record = state
        .engine
        .set_trust_override(&user_id, request.level, &caller.user_id)
        .await?;
    Ok(Json(record))
}

/// POST /admin/reconcile
///
/// Body `{"repair": true}` rewrites drifted projections; default is report only.
pub async fn reconcile(
    State(state): State<AppState>,
    body: Option<Json<ReconcileRequest>>,
) -> ApiResult<Json<ReconcileReport>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let report = state.engine.reconcile(request.repair).await?;
    Ok(Json(report))
}
