//! List capsules API endpoint

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use common::capsule::{CapsuleError, PageRequest, DEFAULT_PAGE_LIMIT};

use super::{engine_error_response, CapsuleView};
use crate::http_server::api::v0::auth::ApiIdentity;
use crate::ServiceState;

#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    /// When false, narrows the listing to unlocked capsules
    #[serde(default = "default_include_locked")]
    pub include_locked: bool,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_include_locked() -> bool {
    true
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_LIMIT as i64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub capsules: Vec<CapsuleView>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

pub async fn handler(
    State(state): State<ServiceState>,
    ApiIdentity(caller): ApiIdentity,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ListError> {
    let page = PageRequest::new(query.page, query.limit);

    let listing = state
        .engine()
        .list(&caller, query.include_locked, page)
        .await?;

    let response = ListResponse {
        total: listing.total,
        page: listing.page,
        limit: listing.limit,
        total_pages: listing.total_pages(),
        has_next: listing.has_next(),
        has_prev: listing.has_prev(),
        capsules: listing.items.into_iter().map(Into::into).collect(),
    };

    Ok((http::StatusCode::OK, Json(response)).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error(transparent)]
    Capsule(#[from] CapsuleError),
}

impl IntoResponse for ListError {
    fn into_response(self) -> Response {
        match self {
            ListError::Capsule(err) => engine_error_response(err),
        }
    }
}
