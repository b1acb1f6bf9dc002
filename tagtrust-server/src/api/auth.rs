//! Caller identity
//!
//! Authentication happens upstream; the gateway forwards the verified user id
//! in `X-User-Id` and the role in `X-User-Role`. Handlers take a [`Caller`],
//! or a [`MaybeCaller`] where anonymous access is allowed; admin routes sit
//! behind [`require_admin`].

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Role value that grants moderation access
pub const ADMIN_ROLE: &str = "admin";

const MAX_USER_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub is_admin: bool,
}

impl Caller {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", USER_ID_HEADER)))?
            .to_str()
            .map_err(|_| ApiError::Unauthorized(format!("{} is not valid text", USER_ID_HEADER)))?
            .trim();

        if user_id.is_empty() || user_id.len() > MAX_USER_ID_LEN {
            return Err(ApiError::Unauthorized(format!(
                "{} must be 1 to {} bytes",
                USER_ID_HEADER, MAX_USER_ID_LEN
            )));
        }

        let is_admin = headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|role| role.trim().eq_ignore_ascii_case(ADMIN_ROLE))
            .unwrap_or(false);

        Ok(Self {
            user_id: user_id.to_string(),
            is_admin,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Caller::from_headers(&parts.headers)
    }
}

/// Identity for routes open to anonymous callers.
///
/// No `X-User-Id` header means anonymous; a header that is present but
/// unusable is still a 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaybeCaller(pub Option<Caller>);

impl MaybeCaller {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        if headers.contains_key(USER_ID_HEADER) {
            Caller::from_headers(headers).map(|caller| MaybeCaller(Some(caller)))
        } else {
            Ok(MaybeCaller(None))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeCaller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        MaybeCaller::from_headers(&parts.headers)
    }
}

/// Admin gate for `/admin` routes
///
/// 401 without an identity, 403 for a non-admin identity.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let caller = Caller::from_headers(request.headers())?;
    if !caller.is_admin {
        warn!(
            user_id = %caller.user_id,
            path = %request.uri().path(),
            "Non-admin caller refused"
        );
        return Err(ApiError::Forbidden("admin role required".to_string()));
    }
    Ok(next.run(request).await)
}
