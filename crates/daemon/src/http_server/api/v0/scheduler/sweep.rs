//! Manual sweep trigger API endpoint

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use crate::http_server::api::client::ApiRequest;
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResponse {
    /// False when the worker is not running
    pub triggered: bool,
}

pub async fn handler(State(state): State<ServiceState>) -> impl IntoResponse {
    let triggered = state.scheduler().request_sweep();

    if triggered {
        tracing::info!("manual sweep requested");
    } else {
        tracing::warn!("manual sweep requested but scheduler is not running");
    }

    (
        http::StatusCode::ACCEPTED,
        Json(SweepResponse { triggered }),
    )
        .into_response()
}

// Client implementation - builds request for this operation
impl ApiRequest for SweepRequest {
    type Response = SweepResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let full_url = base_url.join("/api/v0/scheduler/sweep").unwrap();
        client.post(full_url).json(&self)
    }
}
