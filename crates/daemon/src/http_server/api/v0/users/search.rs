//! User search API endpoint
//!
//! Recipient picker backend: prefix match on email or display name, caller
//! excluded from the results.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::directory::{UserDirectory, UserRecord};

use crate::http_server::api::v0::auth::ApiIdentity;
use crate::ServiceState;

const SEARCH_LIMIT: u32 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
}

impl From<UserRecord> for UserView {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub users: Vec<UserView>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    ApiIdentity(caller): ApiIdentity,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, SearchError> {
    let users = state
        .database()
        .search(&query.q, caller.id, SEARCH_LIMIT)
        .await
        .map_err(|e| SearchError::Directory(e.to_string()))?;

    Ok((
        http::StatusCode::OK,
        Json(SearchResponse {
            users: users.into_iter().map(Into::into).collect(),
        }),
    )
        .into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Directory error: {0}")]
    Directory(String),
}

impl IntoResponse for SearchError {
    fn into_response(self) -> Response {
        tracing::error!("user search failed: {}", self);
        (
            http::StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "internal error" })),
        )
            .into_response()
    }
}
