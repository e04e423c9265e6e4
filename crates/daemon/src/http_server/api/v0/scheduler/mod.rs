//! Unlock scheduler API endpoints
//!
//! Operator surface for the background release worker. These routes skip
//! bearer auth; they sit behind the same trust boundary as `/_status`.

use axum::routing::{get, post};
use axum::Router;

use crate::ServiceState;

pub mod status;
pub mod sweep;

pub use status::{StatusRequest, StatusResponse};
pub use sweep::{SweepRequest, SweepResponse};

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/sweep", post(sweep::handler))
        .route("/status", get(status::handler))
        .with_state(state)
}
