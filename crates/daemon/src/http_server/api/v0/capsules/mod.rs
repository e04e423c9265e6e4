//! Capsule API endpoints
//!
//! REST API for the capsule lifecycle: create, inspect, unlock, download,
//! update, delete.

use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use common::capsule::{Capsule, CapsuleError};

use crate::ServiceState;

pub mod create;
pub mod delete_capsule;
pub mod download;
pub mod get_capsule;
pub mod list;
pub mod stats;
pub mod unlock;
pub mod update;

// Re-export for convenience
pub use create::CreateRequest;
pub use list::ListResponse;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/", post(create::handler))
        .route("/", get(list::handler))
        .route("/stats", get(stats::handler))
        .route("/:capsule_id", get(get_capsule::handler))
        .route("/:capsule_id", put(update::handler))
        .route("/:capsule_id", delete(delete_capsule::handler))
        .route("/:capsule_id/unlock", post(unlock::handler))
        .route("/:capsule_id/download", get(download::handler))
        .with_state(state)
}

/// Wire form of a capsule record.
///
/// The locator and nonce never leave the daemon; everything else is the
/// metadata both parties may see while the capsule is locked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapsuleView {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub recipient_email: Option<String>,
    pub description: Option<String>,
    pub filename: String,
    pub content_kind: String,
    pub payload_size: u64,
    pub state: String,
    #[serde(with = "time::serde::rfc3339")]
    pub unlock_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub unlocked_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Capsule> for CapsuleView {
    fn from(capsule: Capsule) -> Self {
        Self {
            id: capsule.id,
            owner_id: capsule.owner_id,
            recipient_id: capsule.recipient_id,
            recipient_email: capsule.recipient_email,
            description: capsule.description,
            filename: capsule.filename,
            content_kind: capsule.content_kind.as_str().to_string(),
            payload_size: capsule.payload_size,
            state: capsule.state.as_str().to_string(),
            unlock_at: capsule.unlock_at,
            unlocked_at: capsule.unlocked_at,
            created_at: capsule.created_at,
            updated_at: capsule.updated_at,
        }
    }
}

/// Map an engine error onto the wire.
///
/// Backend detail stays in the logs; callers get a generic 500. NotYetDue
/// carries the release date so clients can render the countdown.
pub(super) fn engine_error_response(err: CapsuleError) -> Response {
    match &err {
        CapsuleError::Validation(_) => {
            (http::StatusCode::BAD_REQUEST, error_body(&err)).into_response()
        }
        CapsuleError::NotFound => (http::StatusCode::NOT_FOUND, error_body(&err)).into_response(),
        CapsuleError::Forbidden => (http::StatusCode::FORBIDDEN, error_body(&err)).into_response(),
        CapsuleError::NotYetDue { unlock_at } => {
            let body = serde_json::json!({
                "error": err.to_string(),
                "unlock_at": unlock_at.format(&Rfc3339).ok(),
            });
            (http::StatusCode::CONFLICT, Json(body)).into_response()
        }
        CapsuleError::Frozen => (http::StatusCode::CONFLICT, error_body(&err)).into_response(),
        CapsuleError::Storage(_) | CapsuleError::Decryption(_) => {
            tracing::error!("capsule request failed: {}", err);
            (
                http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "internal error" })),
            )
                .into_response()
        }
    }
}

fn error_body(err: &CapsuleError) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": err.to_string() }))
}
