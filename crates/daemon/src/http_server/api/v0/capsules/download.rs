//! Download capsule payload API endpoint
//!
//! Raw byte download of an already-released payload, with Content-Type
//! guessed from the stored filename.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use common::capsule::CapsuleError;

use super::engine_error_response;
use crate::http_server::api::v0::auth::ApiIdentity;
use crate::ServiceState;

pub async fn handler(
    State(state): State<ServiceState>,
    ApiIdentity(caller): ApiIdentity,
    Path(capsule_id): Path<Uuid>,
) -> Result<Response, DownloadError> {
    let unlocked = state.engine().download(&caller, capsule_id).await?;

    let mime_type = mime_guess::from_path(&unlocked.capsule.filename)
        .first_or_octet_stream()
        .to_string();
    let disposition = format!("attachment; filename=\"{}\"", unlocked.capsule.filename);

    Ok((
        http::StatusCode::OK,
        [
            (axum::http::header::CONTENT_TYPE, mime_type.as_str()),
            (axum::http::header::CONTENT_DISPOSITION, disposition.as_str()),
        ],
        unlocked.data,
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    Capsule(#[from] CapsuleError),
}

impl IntoResponse for DownloadError {
    fn into_response(self) -> Response {
        match self {
            DownloadError::Capsule(err) => engine_error_response(err),
        }
    }
}
