use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

/// Failures of caller-facing interaction operations.
///
/// Absence of live connections is never an error; these cover only what a
/// client asked for and could not get.
#[derive(Debug, thiserror::Error)]
pub enum InteractionError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("not permitted")]
    Forbidden,

    #[error("{0}")]
    Validation(String),

    /// Storage reported a state that breaks an invariant.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage failure")]
    Storage(#[from] anyhow::Error),
}

impl InteractionError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for InteractionError {
    fn into_response(self) -> Response {
        if let Self::Storage(e) = &self {
            error!("Storage failure: {:#}", e);
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}
