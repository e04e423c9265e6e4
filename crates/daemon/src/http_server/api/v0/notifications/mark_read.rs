//! Mark notification read API endpoint

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::http_server::api::v0::auth::ApiIdentity;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub read: bool,
}

pub async fn handler(
    State(state): State<ServiceState>,
    ApiIdentity(caller): ApiIdentity,
    Path(notification_id): Path<Uuid>,
) -> Result<impl IntoResponse, MarkReadError> {
    // Scoped to the caller so one user cannot touch another's feed.
    let updated = state
        .database()
        .mark_notification_read(notification_id, caller.id)
        .await
        .map_err(|e| MarkReadError::Database(e.to_string()))?;

    if !updated {
        return Err(MarkReadError::NotFound);
    }

    Ok((http::StatusCode::OK, Json(MarkReadResponse { read: true })).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum MarkReadError {
    #[error("notification not found")]
    NotFound,
    #[error("Database error: {0}")]
    Database(String),
}

impl IntoResponse for MarkReadError {
    fn into_response(self) -> Response {
        let status = match &self {
            MarkReadError::NotFound => http::StatusCode::NOT_FOUND,
            MarkReadError::Database(_) => {
                tracing::error!("mark read failed: {}", self);
                http::StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = match &self {
            MarkReadError::NotFound => self.to_string(),
            MarkReadError::Database(_) => "internal error".to_string(),
        };
        (status, Json(serde_json::json!({ "error": body }))).into_response()
    }
}
