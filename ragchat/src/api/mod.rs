//! HTTP API routes.
//!
//! Everything except the health probe requires the caller identity header (see
//! [`crate::middleware::require_user`]); `/admin/*` further requires an admin caller
//! ([`crate::middleware::require_admin`]). Engine errors map onto status codes in [`ApiError`].

use std::sync::Arc;

use axum::http::StatusCode;
use axum::middleware as axum_middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

pub mod admin;
pub mod chats;

use crate::error::EngineError;
use crate::middleware;
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/chats", get(chats::list_chats).post(chats::create_chat))
        .route("/api/chats/{chat_id}", get(chats::get_chat))
        .route("/api/chats/{chat_id}/messages", post(chats::post_message))
        .route(
            "/api/messages/{message_id}/feedback",
            post(chats::set_feedback),
        )
        .merge(admin_router(Arc::clone(&state)))
        .layer(axum_middleware::from_fn(middleware::require_user))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn admin_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/admin/ingest",
            get(admin::ingest_status).post(admin::run_ingest),
        )
        .route("/admin/index", get(admin::index_stats))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_admin,
        ))
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// Response-side wrapper so handlers can `?` engine results.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            EngineError::Validation(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            EngineError::Gateway(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            EngineError::Persistence(_) | EngineError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            error!(error = %self.0, "request failed");
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };
        (
            status,
            Json(ErrorBody {
                error: ErrorDetail { code, message },
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayError;

    fn status(e: EngineError) -> StatusCode {
        ApiError(e).into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status(EngineError::Validation("blank".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status(EngineError::NotFound("chat")), StatusCode::NOT_FOUND);
        assert_eq!(
            status(EngineError::Gateway(GatewayError::EmptyOutput)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(EngineError::Persistence(sqlx::Error::PoolTimedOut)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_io_errors_do_not_leak_details() {
        let response = ApiError(EngineError::Io(std::io::Error::from(
            std::io::ErrorKind::NotFound,
        )))
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"]["message"], "internal server error");
    }
}
