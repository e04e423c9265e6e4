use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::request::Parts;

use common::identity::Principal;

use crate::ServiceState;

/// The authenticated caller, resolved from the request's bearer token.
///
/// Every capsule, notification, and user route extracts this; the health
/// and scheduler routes take no authentication.
#[derive(Debug, Clone)]
pub struct ApiIdentity(pub Principal);

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing or malformed Authorization header")]
    MissingToken,
    #[error("token is not recognized")]
    UnknownToken,
    #[error("identity lookup failed: {0}")]
    Lookup(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::MissingToken | AuthError::UnknownToken => http::StatusCode::UNAUTHORIZED,
            AuthError::Lookup(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[async_trait]
impl FromRequestParts<ServiceState> for ApiIdentity {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingToken)?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let principal = state
            .identity()
            .resolve(token)
            .await
            .map_err(|e| AuthError::Lookup(e.to_string()))?
            .ok_or(AuthError::UnknownToken)?;

        Ok(ApiIdentity(principal))
    }
}
