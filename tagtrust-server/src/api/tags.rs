//! Tag submission, listing, withdrawal and voting

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tagtrust_common::{Error, Tag, TagStatus, VoteDirection};
use uuid::Uuid;

use super::auth::{Caller, MaybeCaller};
use crate::engine::{NewTag, ReputationView, Viewer, VoteOutcome, Withdrawal};
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTagsQuery {
    pub content_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub tag_id: Uuid,
    pub status: TagStatus,
    pub tag: Tag,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub direction: VoteDirection,
}

fn viewer_of(caller: &Option<Caller>) -> Viewer<'_> {
    match caller {
        Some(c) if c.is_admin => Viewer::Admin,
        Some(c) => Viewer::User(&c.user_id),
        None => Viewer::Anonymous,
    }
}

/// POST /tags
pub async fn submit_tag(
    State(state): State<AppState>,
    caller: Caller,
    Json(new_tag): Json<NewTag>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let tag = state.engine.submit_tag(new_tag, &caller.user_id).await?;
    let response = SubmitResponse {
        tag_id: tag.id,
        status: tag.status,
        tag,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /tags?contentId=...
///
/// Identity is optional: anonymous callers see approved tags only. A
/// malformed `X-User-Id` is refused rather than treated as anonymous.
pub async fn list_tags(
    State(state): State<AppState>,
    MaybeCaller(caller): MaybeCaller,
    Query(query): Query<ListTagsQuery>,
) -> ApiResult<Json<Vec<Tag>>> {
    let tags = state
        .engine
        .list_tags_for_content(&query.content_id, viewer_of(&caller))
        .await?;
    Ok(Json(tags))
}

/// GET /tags/:id
///
/// Pending tags are visible to their submitter; rejected tags only to admins.
pub async fn get_tag(
    State(state): State<AppState>,
    MaybeCaller(caller): MaybeCaller,
    Path(tag_id): Path<Uuid>,
) -> ApiResult<Json<Tag>> {
    let tag = state.engine.get_tag(tag_id).await?;
    let visible = match viewer_of(&caller) {
        Viewer::Admin => true,
        Viewer::User(user_id) => {
            tag.status == TagStatus::Approved
                || (tag.status == TagStatus::Pending && tag.submitter_id == user_id)
        }
        Viewer::Anonymous => tag.status == TagStatus::Approved,
    };
    if !visible {
        return Err(Error::NotFound(format!("Tag {} not found", tag_id)).into());
    }
    Ok(Json(tag))
}

/// DELETE /tags/:id
pub async fn withdraw_tag(
    State(state): State<AppState>,
    caller: Caller,
    Path(tag_id): Path<Uuid>,
) -> ApiResult<Json<Withdrawal>> {
    let withdrawal = state.engine.withdraw_tag(tag_id, &caller.user_id).await?;
    Ok(Json(withdrawal))
}

/// POST /tags/:id/votes
pub async fn cast_vote(
    State(state): State<AppState>,
    caller: Caller,
    Path(tag_id): Path<Uuid>,
    Json(request): Json<VoteRequest>,
) -> ApiResult<Json<VoteOutcome>> {
    let outcome = state
        .engine
        .cast_vote(tag_id, &caller.user_id, request.direction)
        .await?;
    Ok(Json(outcome))
}

/// GET /users/me/reputation
pub async fn my_reputation(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<ReputationView>> {
    let view = state.engine.reputation_of(&caller.user_id).await?;
    Ok(Json(view))
}
