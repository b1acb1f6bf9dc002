//! HTTP API handlers

pub mod admin;
pub mod auth;
pub mod entities;
pub mod health;
pub mod sse;
pub mod tags;

pub use auth::{require_admin, Caller, MaybeCaller};
pub use health::health_routes;
pub use sse::event_stream;
