//! Scheduler status API endpoint

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use crate::http_server::api::client::ApiRequest;
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// "running" or "stopped"
    pub state: String,
    pub sweeps_completed: u64,
    pub capsules_unlocked: u64,
    pub sweep_interval_secs: u64,
    pub deep_sweep_interval_secs: u64,
}

pub async fn handler(State(state): State<ServiceState>) -> impl IntoResponse {
    let status = state.scheduler().status();

    (http::StatusCode::OK, Json(status)).into_response()
}

// Client implementation - builds request for this operation
impl ApiRequest for StatusRequest {
    type Response = StatusResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        let full_url = base_url.join("/api/v0/scheduler/status").unwrap();
        client.get(full_url)
    }
}
