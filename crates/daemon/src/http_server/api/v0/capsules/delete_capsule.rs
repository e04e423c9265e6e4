//! Delete capsule API endpoint

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::capsule::CapsuleError;

use super::engine_error_response;
use crate::http_server::api::v0::auth::ApiIdentity;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

pub async fn handler(
    State(state): State<ServiceState>,
    ApiIdentity(caller): ApiIdentity,
    Path(capsule_id): Path<Uuid>,
) -> Result<impl IntoResponse, DeleteError> {
    state.engine().delete(&caller, capsule_id).await?;

    tracing::info!(capsule_id = %capsule_id, "capsule deleted");

    Ok((
        http::StatusCode::OK,
        Json(DeleteResponse { deleted: true }),
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    #[error(transparent)]
    Capsule(#[from] CapsuleError),
}

impl IntoResponse for DeleteError {
    fn into_response(self) -> Response {
        match self {
            DeleteError::Capsule(err) => engine_error_response(err),
        }
    }
}
