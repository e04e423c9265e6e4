//! Get capsule metadata API endpoint

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::capsule::CapsuleError;

use super::{engine_error_response, CapsuleView};
use crate::http_server::api::v0::auth::ApiIdentity;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResponse {
    pub capsule: CapsuleView,
}

pub async fn handler(
    State(state): State<ServiceState>,
    ApiIdentity(caller): ApiIdentity,
    Path(capsule_id): Path<Uuid>,
) -> Result<impl IntoResponse, GetError> {
    let capsule = state.engine().get_metadata(&caller, capsule_id).await?;

    Ok((
        http::StatusCode::OK,
        Json(GetResponse {
            capsule: capsule.into(),
        }),
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum GetError {
    #[error(transparent)]
    Capsule(#[from] CapsuleError),
}

impl IntoResponse for GetError {
    fn into_response(self) -> Response {
        match self {
            GetError::Capsule(err) => engine_error_response(err),
        }
    }
}
