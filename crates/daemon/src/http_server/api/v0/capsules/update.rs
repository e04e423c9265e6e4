//! Update capsule API endpoint
//!
//! Owner-only edits to a still-locked capsule. Accepts JSON for metadata
//! changes or multipart when swapping the payload file.

use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use common::capsule::{CapsuleError, PayloadUpload, UpdateCapsule};

use super::{engine_error_response, CapsuleView};
use crate::http_server::api::v0::auth::ApiIdentity;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// Replacement description, when present
    #[serde(default)]
    pub description: Option<String>,

    /// Replacement release date, when present
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub unlock_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub capsule: CapsuleView,
    /// The release date this update replaced
    #[serde(with = "time::serde::rfc3339")]
    pub previous_unlock_at: OffsetDateTime,
}

pub async fn handler(
    State(state): State<ServiceState>,
    ApiIdentity(caller): ApiIdentity,
    Path(capsule_id): Path<Uuid>,
    request: Request,
) -> Result<impl IntoResponse, UpdateError> {
    let content_type = request
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    let input = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state).await.map_err(|e| {
            tracing::error!("Multipart extraction error: {}", e);
            UpdateError::Multipart(e.to_string())
        })?;
        parse_multipart(multipart).await?
    } else {
        let Json(body) = Json::<UpdateRequest>::from_request(request, &state)
            .await
            .map_err(|e| UpdateError::InvalidRequest(e.to_string()))?;
        UpdateCapsule {
            description: body.description,
            unlock_at: body.unlock_at,
            payload: None,
        }
    };

    let outcome = state.engine().update(&caller, capsule_id, input).await?;

    tracing::info!(
        capsule_id = %capsule_id,
        unlock_at = %outcome.capsule.unlock_at,
        "capsule updated"
    );

    Ok((
        http::StatusCode::OK,
        Json(UpdateResponse {
            capsule: outcome.capsule.into(),
            previous_unlock_at: outcome.previous_unlock_at,
        }),
    )
        .into_response())
}

async fn parse_multipart(mut multipart: Multipart) -> Result<UpdateCapsule, UpdateError> {
    let mut changes = UpdateCapsule::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Multipart parsing error: {}", e);
        UpdateError::Multipart(e.to_string())
    })? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "unlock_at" => {
                let text = field.text().await.map_err(|e| {
                    tracing::error!("Error reading unlock_at field: {}", e);
                    UpdateError::Multipart(e.to_string())
                })?;
                changes.unlock_at = Some(
                    OffsetDateTime::parse(text.trim(), &Rfc3339)
                        .map_err(|_| UpdateError::InvalidRequest("Invalid unlock_at".into()))?,
                );
            }
            "description" => {
                changes.description = Some(field.text().await.map_err(|e| {
                    tracing::error!("Error reading description field: {}", e);
                    UpdateError::Multipart(e.to_string())
                })?);
            }
            "file" => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unnamed".to_string());

                tracing::info!("Reading file: {}", filename);
                let data = field.bytes().await.map_err(|e| {
                    tracing::error!("Error reading file data for {}: {}", filename, e);
                    UpdateError::Multipart(e.to_string())
                })?;

                changes.payload = Some(PayloadUpload { filename, data });
            }
            _ => {
                tracing::warn!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    Ok(changes)
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Multipart error: {0}")]
    Multipart(String),
    #[error(transparent)]
    Capsule(#[from] CapsuleError),
}

impl IntoResponse for UpdateError {
    fn into_response(self) -> Response {
        match self {
            UpdateError::InvalidRequest(_) | UpdateError::Multipart(_) => (
                http::StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": self.to_string() })),
            )
                .into_response(),
            UpdateError::Capsule(err) => engine_error_response(err),
        }
    }
}
