//! List notifications API endpoint

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use common::notify::Notification;

use crate::http_server::api::v0::auth::ApiIdentity;
use crate::ServiceState;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    /// Only notifications not yet marked read
    #[serde(default)]
    pub unread_only: bool,
    /// Only notifications created today (UTC)
    #[serde(default)]
    pub today_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationView {
    pub id: Uuid,
    pub capsule_id: Option<Uuid>,
    pub message: String,
    pub read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Notification> for NotificationView {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            capsule_id: n.capsule_id,
            message: n.message,
            read: n.read,
            created_at: n.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListNotificationsResponse {
    pub notifications: Vec<NotificationView>,
    pub count: usize,
}

pub async fn handler(
    State(state): State<ServiceState>,
    ApiIdentity(caller): ApiIdentity,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ListNotificationsError> {
    let notifications = state
        .database()
        .list_notifications(caller.id, query.unread_only, query.today_only)
        .await
        .map_err(|e| ListNotificationsError::Database(e.to_string()))?;

    let views: Vec<NotificationView> = notifications.into_iter().map(Into::into).collect();

    Ok((
        http::StatusCode::OK,
        Json(ListNotificationsResponse {
            count: views.len(),
            notifications: views,
        }),
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum ListNotificationsError {
    #[error("Database error: {0}")]
    Database(String),
}

impl IntoResponse for ListNotificationsError {
    fn into_response(self) -> Response {
        tracing::error!("notification listing failed: {}", self);
        (
            http::StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "internal error" })),
        )
            .into_response()
    }
}
