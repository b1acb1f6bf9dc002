//! tagtrust-server library
//!
//! HTTP surface over the tagging and moderation engine.

use axum::Router;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod engine;
pub mod error;
pub mod pagination;

use engine::Engine;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }
}

/// Build application router
///
/// `/admin/*` requires an admin caller; `/health` and `/buildinfo` require
/// no identity; everything else resolves the caller per handler.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post, put};

    let admin = Router::new()
        .route("/admin/tags", get(api::admin::list_queue))
        .route("/admin/tags/batch-approve", post(api::admin::batch_approve))
        .route("/admin/tags/:id/approve", post(api::admin::approve_tag))
        .route("/admin/tags/:id/reject", post(api::admin::reject_tag))
        .route("/admin/users/:id/reputation", get(api::admin::user_reputation))
        .route(
            "/admin/users/:id/trust-override",
            put(api::admin::set_trust_override),
        )
        .route("/admin/reconcile", post(api::admin::reconcile))
        .route("/admin/events", get(api::event_stream))
        .layer(middleware::from_fn(api::require_admin));

    let public = Router::new()
        .route("/tags", post(api::tags::submit_tag).get(api::tags::list_tags))
        .route(
            "/tags/:id",
            get(api::tags::get_tag).delete(api::tags::withdraw_tag),
        )
        .route("/tags/:id/votes", post(api::tags::cast_vote))
        .route("/users/me/reputation", get(api::tags::my_reputation))
        .route("/entities", get(api::entities::lookup_entities))
        .merge(api::health_routes());

    Router::new()
        .merge(admin)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
