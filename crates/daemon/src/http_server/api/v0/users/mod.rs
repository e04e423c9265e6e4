//! User directory API endpoints

use axum::routing::get;
use axum::Router;

use crate::ServiceState;

pub mod search;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/search", get(search::handler))
        .with_state(state)
}
