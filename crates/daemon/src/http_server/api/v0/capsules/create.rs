//! Create capsule API endpoint
//!
//! Accepts either a JSON body (text-only capsules built from the
//! description) or a multipart form carrying a file payload.

use axum::extract::{FromRequest, Multipart, Request, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use common::capsule::{CapsuleError, CreateCapsule, PayloadUpload};

use super::{engine_error_response, CapsuleView};
use crate::http_server::api::v0::auth::ApiIdentity;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    /// When the capsule becomes eligible for unlock
    #[serde(with = "time::serde::rfc3339")]
    pub unlock_at: OffsetDateTime,

    /// Note shown to both parties while the capsule is locked
    #[serde(default)]
    pub description: Option<String>,

    /// Registered user the capsule is addressed to
    #[serde(default)]
    pub recipient_id: Option<Uuid>,

    /// Fallback address for recipients without an account
    #[serde(default)]
    pub recipient_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResponse {
    pub capsule: CapsuleView,
}

pub async fn handler(
    State(state): State<ServiceState>,
    ApiIdentity(caller): ApiIdentity,
    request: Request,
) -> Result<impl IntoResponse, CreateError> {
    let content_type = request
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();

    let input = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state).await.map_err(|e| {
            tracing::error!("Multipart extraction error: {}", e);
            CreateError::Multipart(e.to_string())
        })?;
        parse_multipart(multipart).await?
    } else {
        let Json(body) = Json::<CreateRequest>::from_request(request, &state)
            .await
            .map_err(|e| CreateError::InvalidRequest(e.to_string()))?;
        CreateCapsule {
            unlock_at: body.unlock_at,
            description: body.description,
            recipient_id: body.recipient_id,
            recipient_email: body.recipient_email,
            payload: None,
        }
    };

    let capsule = state.engine().create(&caller, input).await?;

    tracing::info!(capsule_id = %capsule.id, unlock_at = %capsule.unlock_at, "capsule created");

    Ok((
        http::StatusCode::CREATED,
        Json(CreateResponse {
            capsule: capsule.into(),
        }),
    )
        .into_response())
}

/// Pull capsule fields and the optional file out of a multipart form.
async fn parse_multipart(mut multipart: Multipart) -> Result<CreateCapsule, CreateError> {
    let mut unlock_at: Option<OffsetDateTime> = None;
    let mut description: Option<String> = None;
    let mut recipient_id: Option<Uuid> = None;
    let mut recipient_email: Option<String> = None;
    let mut payload: Option<PayloadUpload> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Multipart parsing error: {}", e);
        CreateError::Multipart(e.to_string())
    })? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "unlock_at" => {
                let text = field.text().await.map_err(|e| {
                    tracing::error!("Error reading unlock_at field: {}", e);
                    CreateError::Multipart(e.to_string())
                })?;
                unlock_at = Some(
                    OffsetDateTime::parse(text.trim(), &Rfc3339)
                        .map_err(|_| CreateError::InvalidRequest("Invalid unlock_at".into()))?,
                );
            }
            "description" => {
                description = Some(field.text().await.map_err(|e| {
                    tracing::error!("Error reading description field: {}", e);
                    CreateError::Multipart(e.to_string())
                })?);
            }
            "recipient_id" => {
                let text = field.text().await.map_err(|e| {
                    tracing::error!("Error reading recipient_id field: {}", e);
                    CreateError::Multipart(e.to_string())
                })?;
                recipient_id = Some(
                    Uuid::parse_str(text.trim())
                        .map_err(|_| CreateError::InvalidRequest("Invalid recipient_id".into()))?,
                );
            }
            "recipient_email" => {
                recipient_email = Some(field.text().await.map_err(|e| {
                    tracing::error!("Error reading recipient_email field: {}", e);
                    CreateError::Multipart(e.to_string())
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
                    CreateError::Multipart(e.to_string())
                })?;

                payload = Some(PayloadUpload { filename, data });
            }
            _ => {
                tracing::warn!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    let unlock_at =
        unlock_at.ok_or_else(|| CreateError::InvalidRequest("unlock_at is required".into()))?;

    Ok(CreateCapsule {
        unlock_at,
        description,
        recipient_id,
        recipient_email,
        payload,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Multipart error: {0}")]
    Multipart(String),
    #[error(transparent)]
    Capsule(#[from] CapsuleError),
}

impl IntoResponse for CreateError {
    fn into_response(self) -> Response {
        match self {
            CreateError::InvalidRequest(_) | CreateError::Multipart(_) => (
                http::StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": self.to_string() })),
            )
                .into_response(),
            CreateError::Capsule(err) => engine_error_response(err),
        }
    }
}
