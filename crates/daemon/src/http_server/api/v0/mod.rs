use axum::Router;

pub mod auth;
pub mod capsules;
pub mod notifications;
pub mod scheduler;
pub mod users;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .nest("/capsules", capsules::router(state.clone()))
        .nest("/notifications", notifications::router(state.clone()))
        .nest("/users", users::router(state.clone()))
        .nest("/scheduler", scheduler::router(state.clone()))
        .with_state(state)
}
