use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use agora_types::api::{Claims, CreatePollRequest, VoteRequest};

use crate::error::InteractionError;
use crate::state::AppState;

pub async fn create_poll(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePollRequest>,
) -> Result<impl IntoResponse, InteractionError> {
    let poll = state.polls.create(claims.sub, &req.question, &req.options).await?;
    Ok((StatusCode::CREATED, Json(poll)))
}

pub async fn get_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
) -> Result<impl IntoResponse, InteractionError> {
    Ok(Json(state.polls.get(poll_id).await?))
}

pub async fn vote(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<VoteRequest>,
) -> Result<impl IntoResponse, InteractionError> {
    Ok(Json(state.polls.vote(poll_id, claims.sub, req.option_index).await?))
}

pub async fn retract_vote(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, InteractionError> {
    Ok(Json(state.polls.retract(poll_id, claims.sub).await?))
}
