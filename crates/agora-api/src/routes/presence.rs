use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use agora_types::api::{OnlineUsersResponse, PresenceResponse};

use crate::state::AppState;

pub async fn user_presence(State(state): State<AppState>, Path(user_id): Path<Uuid>) -> impl IntoResponse {
    Json(PresenceResponse {
        user_id,
        online: state.registry.is_online(user_id).await,
    })
}

/// Users with at least one live gateway connection.
pub async fn online_users(State(state): State<AppState>) -> impl IntoResponse {
    let mut user_ids = state.registry.online_users().await;
    user_ids.sort();
    Json(OnlineUsersResponse {
        user_ids,
        connections: state.registry.connection_count().await,
    })
}
