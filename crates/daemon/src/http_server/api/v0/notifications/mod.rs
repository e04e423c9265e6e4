//! Notification feed API endpoints

use axum::routing::{get, post};
use axum::Router;

use crate::ServiceState;

pub mod list;
pub mod mark_read;

pub use list::{ListNotificationsResponse, NotificationView};

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/", get(list::handler))
        .route("/:notification_id/read", post(mark_read::handler))
        .with_state(state)
}
