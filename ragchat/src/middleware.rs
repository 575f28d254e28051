use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::AppState;

/// Header carrying the caller's identity, set by the authenticating proxy in front of us.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller, inserted into request extensions by [`require_user`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

/// Middleware: reject requests without a caller identity.
/// The health probe is the only route served anonymously.
pub async fn require_user(mut req: Request, next: Next) -> Response {
    if req.uri().path() == "/api/health" {
        return next.run(req).await;
    }

    let user_id = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string);

    let Some(user_id) = user_id else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": { "code": "UNAUTHENTICATED", "message": "missing user identity" }
            })),
        )
            .into_response();
    };

    req.extensions_mut().insert(UserId(user_id));
    next.run(req).await
}

/// Middleware for `/admin/*`: the caller must be on the configured admin list.
/// Runs inside [`require_user`], so the identity is already present.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let allowed = req
        .extensions()
        .get::<UserId>()
        .is_some_and(|UserId(id)| state.is_admin(id));

    if !allowed {
        warn!(path = %req.uri().path(), "admin route refused");
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": { "code": "FORBIDDEN", "message": "admin access required" }
            })),
        )
            .into_response();
    }

    next.run(req).await
}
