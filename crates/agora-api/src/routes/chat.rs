use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use agora_types::api::{Claims, CreateConversationRequest, DeleteResponse, EditContentRequest, SendMessageRequest};
use agora_types::models::ContentKind;

use crate::error::InteractionError;
use crate::state::AppState;
use crate::threads::MessageCursor;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor-based pagination: the `created_at` and `id` of the oldest
    /// message from the previous page.
    pub before: Option<DateTime<Utc>>,
    pub before_id: Option<Uuid>,
}

fn default_limit() -> u32 {
    50
}

pub async fn open_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, InteractionError> {
    let conversation = state.threads.open_conversation(claims.sub, req.member_ids).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, InteractionError> {
    Ok(Json(state.threads.conversation(conversation_id, claims.sub).await?))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, InteractionError> {
    let cursor = query.before.map(|created_at| MessageCursor {
        created_at,
        id: query.before_id,
    });
    let messages = state
        .threads
        .history(conversation_id, claims.sub, query.limit, cursor)
        .await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, InteractionError> {
    let message = state
        .threads
        .create(ContentKind::Message, conversation_id, req.reply_to, claims.sub, &req.body)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, InteractionError> {
    Ok(Json(state.threads.get(ContentKind::Message, message_id, claims.sub).await?))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditContentRequest>,
) -> Result<impl IntoResponse, InteractionError> {
    let message = state
        .threads
        .edit(ContentKind::Message, message_id, claims.sub, &req.body)
        .await?;
    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, InteractionError> {
    let removed_ids = state.threads.delete(ContentKind::Message, message_id, claims.sub).await?;
    Ok(Json(DeleteResponse { removed_ids }))
}

pub async fn toggle_like(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, InteractionError> {
    Ok(Json(state.threads.toggle_like(ContentKind::Message, message_id, claims.sub).await?))
}

pub async fn add_reaction(
    State(state): State<AppState>,
    Path((message_id, emoji)): Path<(Uuid, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, InteractionError> {
    Ok(Json(state.threads.react(ContentKind::Message, message_id, claims.sub, &emoji).await?))
}

pub async fn remove_reaction(
    State(state): State<AppState>,
    Path((message_id, emoji)): Path<(Uuid, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, InteractionError> {
    Ok(Json(state.threads.unreact(ContentKind::Message, message_id, claims.sub, &emoji).await?))
}
