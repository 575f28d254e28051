use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use shared_types::{
    Chat, ChatWithMessages, CreateChatRequest, FeedbackRequest, Message, PostMessageRequest,
};

use super::ApiError;
use crate::middleware::UserId;
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 100;

/// POST /api/chats
pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    Extension(UserId(owner)): Extension<UserId>,
    Json(req): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<ChatWithMessages>), ApiError> {
    let created = state
        .orchestrator
        .create_chat(&owner, req.first_message.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/chats
pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    Extension(UserId(owner)): Extension<UserId>,
) -> Result<Json<Vec<Chat>>, ApiError> {
    Ok(Json(state.orchestrator.list_chats(&owner).await?))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/chats/{chat_id}?limit=&offset=
pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    Extension(UserId(owner)): Extension<UserId>,
    Path(chat_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ChatWithMessages>, ApiError> {
    let details = state
        .orchestrator
        .chat_details(
            &chat_id,
            &owner,
            page.limit.unwrap_or(DEFAULT_PAGE_SIZE),
            page.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(details))
}

/// POST /api/chats/{chat_id}/messages
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Extension(UserId(owner)): Extension<UserId>,
    Path(chat_id): Path<String>,
    Json(req): Json<PostMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let reply = state
        .orchestrator
        .post_message(&chat_id, &owner, &req.content)
        .await?;
    Ok(Json(reply))
}

/// POST /api/messages/{message_id}/feedback
pub async fn set_feedback(
    State(state): State<Arc<AppState>>,
    Extension(UserId(owner)): Extension<UserId>,
    Path(message_id): Path<String>,
    Json(req): Json<FeedbackRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .orchestrator
        .set_feedback(&message_id, &owner, req.negative)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
