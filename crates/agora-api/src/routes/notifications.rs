use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use agora_types::api::{Claims, UnreadCountResponse};

use crate::error::InteractionError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, InteractionError> {
    Ok(Json(state.notifications.list(claims.sub, query.limit).await?))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, InteractionError> {
    let unread = state.notifications.unread_count(claims.sub).await?;
    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, InteractionError> {
    Ok(Json(state.notifications.mark_read(notification_id, claims.sub).await?))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, InteractionError> {
    Ok(Json(state.notifications.mark_all_read(claims.sub).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, InteractionError> {
    state.notifications.delete(notification_id, claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}
