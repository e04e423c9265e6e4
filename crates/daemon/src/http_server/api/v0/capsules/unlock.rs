//! Unlock capsule API endpoint
//!
//! Releases a due capsule to its recipient. Text payloads come back inline;
//! anything else is base64 so the response stays valid JSON.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::capsule::{CapsuleError, ContentKind};

use super::{engine_error_response, CapsuleView};
use crate::http_server::api::v0::auth::ApiIdentity;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockResponse {
    pub capsule: CapsuleView,
    /// True when this request performed the release
    pub freshly_unlocked: bool,
    pub notified: bool,
    pub emailed: bool,
    /// Payload inline, for text capsules with valid UTF-8
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Payload as base64, for everything else
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_base64: Option<String>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    ApiIdentity(caller): ApiIdentity,
    Path(capsule_id): Path<Uuid>,
) -> Result<impl IntoResponse, UnlockError> {
    let unlocked = state.engine().unlock(&caller, capsule_id).await?;

    tracing::info!(
        capsule_id = %capsule_id,
        freshly_unlocked = unlocked.freshly_unlocked,
        "capsule unlocked"
    );

    let mut text = None;
    let mut content_base64 = None;
    if unlocked.capsule.content_kind == ContentKind::Text {
        match String::from_utf8(unlocked.data.to_vec()) {
            Ok(s) => text = Some(s),
            Err(_) => {
                content_base64 =
                    Some(base64::engine::general_purpose::STANDARD.encode(&unlocked.data))
            }
        }
    } else {
        content_base64 = Some(base64::engine::general_purpose::STANDARD.encode(&unlocked.data));
    }

    Ok((
        http::StatusCode::OK,
        Json(UnlockResponse {
            capsule: unlocked.capsule.into(),
            freshly_unlocked: unlocked.freshly_unlocked,
            notified: unlocked.receipt.notified,
            emailed: unlocked.receipt.emailed,
            text,
            content_base64,
        }),
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum UnlockError {
    #[error(transparent)]
    Capsule(#[from] CapsuleError),
}

impl IntoResponse for UnlockError {
    fn into_response(self) -> Response {
        match self {
            UnlockError::Capsule(err) => engine_error_response(err),
        }
    }
}
