use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use agora_types::api::{Claims, CreateCommentRequest, DeleteResponse, EditContentRequest};
use agora_types::models::ContentKind;

use crate::error::InteractionError;
use crate::state::AppState;

pub async fn list_thread(
    State(state): State<AppState>,
    Path(subject_id): Path<Uuid>,
) -> Result<impl IntoResponse, InteractionError> {
    Ok(Json(state.threads.thread(subject_id).await?))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Path(subject_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, InteractionError> {
    let comment = state
        .threads
        .create(ContentKind::Comment, subject_id, req.parent_id, claims.sub, &req.body)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn get_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, InteractionError> {
    Ok(Json(state.threads.get(ContentKind::Comment, comment_id, claims.sub).await?))
}

pub async fn edit_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditContentRequest>,
) -> Result<impl IntoResponse, InteractionError> {
    let comment = state
        .threads
        .edit(ContentKind::Comment, comment_id, claims.sub, &req.body)
        .await?;
    Ok(Json(comment))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, InteractionError> {
    let removed_ids = state.threads.delete(ContentKind::Comment, comment_id, claims.sub).await?;
    Ok(Json(DeleteResponse { removed_ids }))
}

pub async fn toggle_like(
    State(state): State<AppState>,
    Path(comment_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, InteractionError> {
    Ok(Json(state.threads.toggle_like(ContentKind::Comment, comment_id, claims.sub).await?))
}

pub async fn add_reaction(
    State(state): State<AppState>,
    Path((comment_id, emoji)): Path<(Uuid, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, InteractionError> {
    Ok(Json(state.threads.react(ContentKind::Comment, comment_id, claims.sub, &emoji).await?))
}

pub async fn remove_reaction(
    State(state): State<AppState>,
    Path((comment_id, emoji)): Path<(Uuid, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, InteractionError> {
    Ok(Json(state.threads.unreact(ContentKind::Comment, comment_id, claims.sub, &emoji).await?))
}
