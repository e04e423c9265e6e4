//! Capsule stats API endpoint

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use common::capsule::CapsuleError;

use super::engine_error_response;
use crate::http_server::api::v0::auth::ApiIdentity;
use crate::ServiceState;

pub async fn handler(
    State(state): State<ServiceState>,
    ApiIdentity(caller): ApiIdentity,
) -> Result<impl IntoResponse, StatsError> {
    let stats = state.engine().stats(&caller).await?;

    Ok((http::StatusCode::OK, Json(stats)).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error(transparent)]
    Capsule(#[from] CapsuleError),
}

impl IntoResponse for StatsError {
    fn into_response(self) -> Response {
        match self {
            StatsError::Capsule(err) => engine_error_response(err),
        }
    }
}
