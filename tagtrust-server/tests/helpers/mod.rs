//! Test helpers for tagtrust-server integration tests
//!
//! - TestApp: engine + router over a fresh temp-file database
//! - Request builders that attach caller identity headers
//! - Shortcuts for driving users through submissions and approvals

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tagtrust_common::db::init_database;
use tagtrust_common::events::EventBus;
use tagtrust_common::{Tag, TagStatus};
use tagtrust_server::api::auth::{ADMIN_ROLE, USER_ID_HEADER, USER_ROLE_HEADER};
use tagtrust_server::engine::{Engine, EngineSettings, NewTag};
use tagtrust_server::{build_router, AppState};
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const ADMIN: &str = "mod-1";

pub struct TestApp {
    pub engine: Engine,
    pub router: Router,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_settings(EngineSettings {
            max_lock_wait_ms: 10_000,
            page_size: 50,
        })
        .await
    }

    pub async fn with_settings(settings: EngineSettings) -> Self {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("tagtrust.db")).await.unwrap();
        let engine = Engine::new(pool, EventBus::new(1024), settings);
        let router = build_router(AppState::new(engine.clone()));
        Self {
            engine,
            router,
            _dir: dir,
        }
    }

    /// Send a request and decode the JSON body (Null when empty)
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    /// Submit directly through the engine
    pub async fn submit(&self, user: &str, content_id: &str, name: &str) -> Tag {
        self.engine
            .submit_tag(new_tag(content_id, name), user)
            .await
            .unwrap()
    }

    /// Submit and approve `count` tags for `user` on distinct content items
    pub async fn approved_history(&self, user: &str, count: usize) -> Vec<Tag> {
        let mut tags = Vec::with_capacity(count);
        for i in 0..count {
            let content_id = format!("{}-history-{}", user, i);
            let tag = self
                .submit(user, &content_id, &format!("{} subject {}", user, i))
                .await;
            let tag = if tag.status == TagStatus::Pending {
                self.engine.approve_tag(tag.id, ADMIN).await.unwrap()
            } else {
                tag
            };
            tags.push(tag);
        }
        tags
    }
}

pub fn new_tag(content_id: &str, name: &str) -> NewTag {
    NewTag {
        content_id: content_id.to_string(),
        entity_name: name.to_string(),
        attrs: None,
    }
}

/// Request with an optional caller identity and JSON body
pub fn request(
    method: &str,
    uri: &str,
    user: Option<&str>,
    admin: bool,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user);
    }
    if admin {
        builder = builder.header(USER_ROLE_HEADER, ADMIN_ROLE);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn user_request(method: &str, uri: &str, user: &str, body: Option<Value>) -> Request<Body> {
    request(method, uri, Some(user), false, body)
}

pub fn admin_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    request(method, uri, Some(ADMIN), true, body)
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
